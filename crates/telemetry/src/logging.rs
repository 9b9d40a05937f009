//! Logger initialization, grounded on the teacher's `server::logger` module
//! but without the OTEL/TUI appenders it wires up alongside stderr.

use std::{fmt::Write, io::IsTerminal, str::FromStr, sync::Once};

use config::LogFormat;
use logforth::{
    append::Stderr,
    filter::EnvFilter,
    layout::Layout,
};

static INIT: Once = Once::new();

/// The two log layouts `gateway` can select via [`config::LogFormat`].
#[derive(Debug)]
enum GatewayLayout {
    /// Human-readable, UTC timestamps, colored levels when stderr is a tty.
    Pretty { no_color: bool },
    /// Newline-delimited JSON, for production log shipping.
    Json,
}

impl Layout for GatewayLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let now = jiff::Zoned::now().with_time_zone(jiff::tz::TimeZone::UTC);
        let timestamp = now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();

        match self {
            Self::Pretty { no_color } => {
                let mut output = String::new();
                write!(output, "{timestamp} ")?;

                let level_str = if *no_color {
                    format!("{:>5}", record.level())
                } else {
                    match record.level() {
                        log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                        log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                        log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                        log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                        log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
                    }
                };

                write!(output, "{level_str}  {}", record.args())?;
                Ok(output.into_bytes())
            }
            Self::Json => {
                let line = serde_json::json!({
                    "timestamp": timestamp,
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "message": record.args().to_string(),
                });
                Ok(serde_json::to_vec(&line)?)
            }
        }
    }
}

/// Installs the global logger. `log_filter` follows `env_logger` syntax
/// (e.g. `"info"` or `"protocol=debug,gateway=info"`). Safe to call more than
/// once; only the first call takes effect.
pub fn init(log_filter: &str, format: LogFormat) {
    let log_filter = log_filter.to_owned();
    INIT.call_once(move || apply_logger(&log_filter, format));
}

fn apply_logger(log_filter: &str, format: LogFormat) {
    let filter_str = log_filter.to_owned();

    logforth::builder()
        .dispatch(move |d| {
            let filter = EnvFilter::from_str(&filter_str)
                .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter is valid"));

            let layout = match format {
                LogFormat::Json => GatewayLayout::Json,
                LogFormat::Pretty => GatewayLayout::Pretty { no_color: !std::io::stderr().is_terminal() },
            };

            d.filter(filter).append(Stderr::default().with_layout(layout))
        })
        .apply();
}
