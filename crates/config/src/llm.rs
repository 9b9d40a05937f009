//! LLM provider and protocol-mount configuration.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;

/// One upstream provider the demo `gateway` binary can route a request to.
/// Only what `protocol::upstream` needs to dispatch a request: where to send
/// it and which credential to attach.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL the provider's API is reached at, e.g. `https://api.openai.com`.
    pub base_url: String,
    /// API key, typically supplied as `{{ env.OPENAI_API_KEY }}` and expanded at load time.
    pub api_key: SecretString,
    /// Wire format this provider speaks: one of `chat`, `messages`, `gemini`, `responses`.
    pub egress_format: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: SecretString::from(String::new()),
            egress_format: "chat".to_string(),
        }
    }
}

/// Whether an ingress protocol is mounted, and under what path prefix.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolEndpointConfig {
    /// Whether this protocol's routes are mounted at all.
    pub enabled: bool,
    /// Path prefix the protocol's routes are nested under.
    pub path: String,
}

/// Mount configuration for each of the four ingress wire formats.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolsConfig {
    /// OpenAI Chat Completions ingress.
    pub chat: ProtocolEndpointConfig,
    /// Anthropic Messages ingress.
    pub messages: ProtocolEndpointConfig,
    /// Google Gemini GenerateContent ingress.
    pub gemini: ProtocolEndpointConfig,
    /// OpenAI Responses ingress.
    pub responses: ProtocolEndpointConfig,
}

impl Default for ProtocolsConfig {
    fn default() -> Self {
        Self {
            chat: ProtocolEndpointConfig { enabled: true, path: "/openai".to_string() },
            messages: ProtocolEndpointConfig { enabled: true, path: "/anthropic".to_string() },
            gemini: ProtocolEndpointConfig { enabled: true, path: "/gemini".to_string() },
            responses: ProtocolEndpointConfig { enabled: true, path: "/openai/responses".to_string() },
        }
    }
}

/// LLM configuration settings: the providers reachable and which ingress
/// protocols are mounted.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Named upstream providers, keyed by an arbitrary identifier used by the
    /// external `Router`.
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Ingress protocol mount configuration.
    pub protocols: ProtocolsConfig,
}
