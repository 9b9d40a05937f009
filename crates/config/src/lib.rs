//! Configuration structures mapping the gateway's `config.toml`.

#![deny(missing_docs)]

mod llm;
mod loader;
mod server;
mod telemetry;

pub use llm::{LlmConfig, ProtocolEndpointConfig, ProtocolsConfig, ProviderConfig};
pub use server::ServerConfig;
pub use telemetry::{LogFormat, TelemetryConfig};

use serde::Deserialize;

/// Top-level configuration for the gateway binary. Deliberately holds only
/// what is needed to run the demo: listen address, per-provider base
/// URL/API key, which ingress protocols are mounted and where, and
/// telemetry toggles. Alias→target routing, cooldown policy, and pricing
/// stay with the external `Router` the caller supplies; they are never
/// config-file concerns here.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// LLM provider and protocol configuration settings.
    pub llm: LlmConfig,
    /// Telemetry configuration settings.
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path, expanding `{{ env.VAR }}` placeholders.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_parse() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.server.listen_address.is_none());
        assert!(config.llm.providers.is_empty());
    }
}
