//! Logging for the `gateway` binary (§A.1).
//!
//! Trimmed from the teacher's OpenTelemetry-backed telemetry crate to a
//! single `logforth` logger install. `fastrace` spans live directly on
//! `protocol::request_context::RequestContext`; exporting them is a build
//! feature this crate has no opinion on.

mod logging;

pub use logging::init;
