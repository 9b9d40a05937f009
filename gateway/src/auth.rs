//! Demo [`AuthBroker`] implementation: attaches the configured provider's
//! API key under whichever header convention its `egress_format` expects.
//!
//! Grounded on the teacher's per-provider header setup in
//! `llm::provider::{anthropic,google,openai}`, collapsed into one broker
//! since this crate has no per-provider client types to hang the header
//! construction on.

use std::collections::BTreeMap;

use async_trait::async_trait;
use config::ProviderConfig;
use http::{HeaderMap, HeaderValue, header};
use protocol::{GatewayError, Result, interfaces::AuthBroker};
use secrecy::ExposeSecret;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ConfigAuthBroker {
    providers: BTreeMap<String, ProviderConfig>,
}

impl ConfigAuthBroker {
    pub fn new(providers: BTreeMap<String, ProviderConfig>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl AuthBroker for ConfigAuthBroker {
    async fn headers_for(&self, provider: &str) -> Result<HeaderMap> {
        let config = self
            .providers
            .get(provider)
            .ok_or_else(|| GatewayError::Internal(Some(format!("no credentials configured for provider '{provider}'"))))?;

        let key = config.api_key.expose_secret();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match config.egress_format.as_str() {
            "messages" => {
                let value = HeaderValue::from_str(key)
                    .map_err(|e| GatewayError::Internal(Some(format!("invalid api key for '{provider}': {e}"))))?;
                headers.insert("x-api-key", value);
                headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
            }
            "gemini" => {
                let value = HeaderValue::from_str(key)
                    .map_err(|e| GatewayError::Internal(Some(format!("invalid api key for '{provider}': {e}"))))?;
                headers.insert("x-goog-api-key", value);
            }
            _ => {
                let value = HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| GatewayError::Internal(Some(format!("invalid api key for '{provider}': {e}"))))?;
                headers.insert(header::AUTHORIZATION, value);
            }
        }

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn provider(egress_format: &str) -> ProviderConfig {
        ProviderConfig {
            base_url: "https://example.invalid".to_string(),
            api_key: SecretString::from("sk-test".to_string()),
            egress_format: egress_format.to_string(),
        }
    }

    #[tokio::test]
    async fn chat_provider_uses_bearer_auth() {
        let mut providers = BTreeMap::new();
        providers.insert("openai".to_string(), provider("chat"));
        let broker = ConfigAuthBroker::new(providers);

        let headers = broker.headers_for("openai").await.unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer sk-test");
    }

    #[tokio::test]
    async fn messages_provider_uses_x_api_key() {
        let mut providers = BTreeMap::new();
        providers.insert("anthropic".to_string(), provider("messages"));
        let broker = ConfigAuthBroker::new(providers);

        let headers = broker.headers_for("anthropic").await.unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-test");
        assert!(headers.contains_key("anthropic-version"));
    }

    #[tokio::test]
    async fn gemini_provider_uses_x_goog_api_key() {
        let mut providers = BTreeMap::new();
        providers.insert("gemini".to_string(), provider("gemini"));
        let broker = ConfigAuthBroker::new(providers);

        let headers = broker.headers_for("gemini").await.unwrap();
        assert_eq!(headers.get("x-goog-api-key").unwrap(), "sk-test");
    }

    #[tokio::test]
    async fn unknown_provider_errors() {
        let broker = ConfigAuthBroker::new(BTreeMap::new());
        assert!(broker.headers_for("missing").await.is_err());
    }
}
