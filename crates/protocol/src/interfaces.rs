//! External collaborator contracts consumed by the core (§6.1).
//!
//! None of these are implemented here beyond trivial defaults for the demo
//! binary — routing policy, credential storage, and usage persistence are
//! all out of scope for the core; it only calls through these traits.

use async_trait::async_trait;

use crate::{error::Result, ir::IrRequest, transformer::ApiFormat};

/// Resolves an IR request to an upstream target. The core never caches or
/// retries; that policy lives entirely behind this trait.
#[async_trait]
pub trait Router: Send + Sync {
    async fn resolve(&self, request: &IrRequest, ingress: ApiFormat) -> Result<RouteTarget>;
}

#[derive(Debug, Clone)]
pub struct RouteTarget {
    pub provider: String,
    pub provider_model_id: String,
    pub egress_api_type: ApiFormat,
    pub base_url: String,
    pub endpoint_override: Option<String>,
}

/// Supplies the headers required to reach a given provider. Invoked
/// synchronously before upstream dispatch.
#[async_trait]
pub trait AuthBroker: Send + Sync {
    async fn headers_for(&self, provider: &str) -> Result<http::HeaderMap>;
}

/// The outcome of a single request, handed to the usage sink at completion.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub request_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub usage: crate::ir::IrUsage,
    pub ttft: Option<std::time::Duration>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Completed,
    ClientDisconnect,
    UpstreamError,
}

/// Receives finalized usage + timing records at request completion. The core
/// never persists these itself.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: UsageRecord);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Structured error/trace hook. The core must tolerate [`NoopLogger`].
pub trait Logger: Send + Sync {
    fn event(&self, level: LogLevel, message: &str, fields: &[(&str, &str)]);
}

/// A logger that discards every event. The default when no caller-supplied
/// logger is wired up.
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn event(&self, _level: LogLevel, _message: &str, _fields: &[(&str, &str)]) {}
}

/// A single-target router for the demo binary: every request resolves to the
/// same provider/model regardless of what it asked for. Not part of the
/// core's contract.
pub struct StaticRouter {
    pub target: RouteTarget,
}

#[async_trait]
impl Router for StaticRouter {
    async fn resolve(&self, _request: &IrRequest, _ingress: ApiFormat) -> Result<RouteTarget> {
        Ok(self.target.clone())
    }
}
