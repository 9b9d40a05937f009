//! Demo [`Logger`] and [`UsageSink`] implementations: both just forward to
//! the `log` facade `telemetry::init` installed at startup. A production
//! caller would swap these for something that ships usage records to
//! billing and traces to a collector; the core has no opinion on either.

use async_trait::async_trait;
use protocol::interfaces::{Logger, LogLevel, UsageRecord, UsageSink};

pub struct LogLogger;

impl Logger for LogLogger {
    fn event(&self, level: LogLevel, message: &str, fields: &[(&str, &str)]) {
        let suffix = fields.iter().map(|(k, v)| format!(" {k}={v}")).collect::<String>();

        match level {
            LogLevel::Error => log::error!("{message}{suffix}"),
            LogLevel::Warn => log::warn!("{message}{suffix}"),
            LogLevel::Info => log::info!("{message}{suffix}"),
            LogLevel::Debug => log::debug!("{message}{suffix}"),
        }
    }
}

pub struct LogUsageSink;

#[async_trait]
impl UsageSink for LogUsageSink {
    async fn record(&self, record: UsageRecord) {
        log::info!(
            "request completed request_id={:?} provider={} model={} status={:?} input_tokens={} output_tokens={}",
            record.request_id,
            record.provider,
            record.model,
            record.status,
            record.usage.input_tokens,
            record.usage.output_tokens,
        );
    }
}
