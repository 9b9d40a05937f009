//! Provider-agnostic gateway core: unified IR, per-format transformers, and
//! the axum wiring that drives them end to end (§1-§6).
//!
//! This crate has no opinion on routing policy, credential storage, or usage
//! persistence — it calls through the traits in [`interfaces`] for all three
//! and never implements them itself beyond the trivial demo defaults
//! ([`interfaces::StaticRouter`], [`interfaces::NoopLogger`]).

pub mod error;
pub mod interfaces;
pub mod ir;
pub mod models;
pub mod oauth;
pub mod protocols;
pub mod request_context;
pub mod server;
pub mod stream;
pub mod token_counter;
pub mod transformer;
pub mod upstream;

pub use error::{GatewayError, Result};
pub use interfaces::{AuthBroker, Logger, LogLevel, Router, UsageSink};
pub use request_context::RequestContext;
pub use server::GatewayServer;
pub use transformer::{ApiFormat, Transformer};
