//! Telemetry toggles (§A.1, §A.5). Trimmed to what the `gateway` binary's
//! `log`/`logforth` logger and `fastrace` spans need; there is no OTLP
//! exporter configuration here, unlike the teacher's full telemetry crate.

use serde::Deserialize;

/// Output format for the structured logger `gateway` installs at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, for local development.
    #[default]
    Pretty,
    /// Newline-delimited JSON, for production log shipping.
    Json,
}

/// Telemetry configuration for observability.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Structured log output format.
    pub log_format: LogFormat,
    /// Whether `fastrace` spans are exported. Inert without the `telemetry`
    /// build feature regardless of this setting.
    pub tracing_enabled: bool,
}
