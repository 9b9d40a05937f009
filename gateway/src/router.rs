//! Demo [`Router`] implementation: resolves a `"provider/model"`-shaped
//! model string against the providers configured in `config.toml`.
//!
//! Grounded on the teacher's `llm::server::resolve_model_route`'s legacy
//! `provider/model` prefix form, without its pattern-route or load-balancing
//! layers — those are exactly the alias→target routing table the core
//! deliberately keeps external.

use std::collections::BTreeMap;

use async_trait::async_trait;
use config::ProviderConfig;
use protocol::{
    GatewayError, Result,
    interfaces::{RouteTarget, Router},
    ir::IrRequest,
    transformer::ApiFormat,
};

pub struct ConfigRouter {
    providers: BTreeMap<String, ProviderConfig>,
}

impl ConfigRouter {
    pub fn new(providers: BTreeMap<String, ProviderConfig>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Router for ConfigRouter {
    async fn resolve(&self, request: &IrRequest, _ingress: ApiFormat) -> Result<RouteTarget> {
        let Some((provider_name, model_name)) = request.model.split_once('/') else {
            return Err(GatewayError::MalformedRequest(format!(
                "model '{}' is not in 'provider/model' form",
                request.model
            )));
        };

        if model_name.is_empty() {
            return Err(GatewayError::MalformedRequest(format!(
                "model '{}' is missing a model name after the provider",
                request.model
            )));
        }

        let provider = self.providers.get(provider_name).ok_or_else(|| {
            let available: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            GatewayError::MalformedRequest(format!(
                "unknown provider '{provider_name}'. configured providers: [{}]",
                available.join(", ")
            ))
        })?;

        let egress_api_type = parse_api_format(&provider.egress_format)?;

        Ok(RouteTarget {
            provider: provider_name.to_string(),
            provider_model_id: model_name.to_string(),
            egress_api_type,
            base_url: provider.base_url.clone(),
            endpoint_override: None,
        })
    }
}

fn parse_api_format(value: &str) -> Result<ApiFormat> {
    match value {
        "chat" => Ok(ApiFormat::Chat),
        "messages" => Ok(ApiFormat::Messages),
        "gemini" => Ok(ApiFormat::Gemini),
        "responses" => Ok(ApiFormat::Responses),
        other => {
            Err(GatewayError::Internal(Some(format!("provider configured with unknown egress_format '{other}'"))))
        }
    }
}

#[cfg(test)]
mod tests {
    use config::ProviderConfig;
    use secrecy::SecretString;

    use super::*;

    fn provider(egress_format: &str) -> ProviderConfig {
        ProviderConfig {
            base_url: "https://api.openai.com".to_string(),
            api_key: SecretString::from("sk-test".to_string()),
            egress_format: egress_format.to_string(),
        }
    }

    fn request(model: &str) -> IrRequest {
        IrRequest {
            model: model.to_string(),
            messages: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
            reasoning: None,
            max_tokens: None,
            temperature: None,
            stream: false,
            request_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn resolves_known_provider() {
        let mut providers = BTreeMap::new();
        providers.insert("openai".to_string(), provider("chat"));
        let router = ConfigRouter::new(providers);

        let target = router.resolve(&request("openai/gpt-4o"), ApiFormat::Chat).await.unwrap();
        assert_eq!(target.provider, "openai");
        assert_eq!(target.provider_model_id, "gpt-4o");
        assert_eq!(target.egress_api_type, ApiFormat::Chat);
    }

    #[tokio::test]
    async fn rejects_unknown_provider() {
        let router = ConfigRouter::new(BTreeMap::new());
        assert!(router.resolve(&request("openai/gpt-4o"), ApiFormat::Chat).await.is_err());
    }

    #[tokio::test]
    async fn rejects_model_without_provider_prefix() {
        let mut providers = BTreeMap::new();
        providers.insert("openai".to_string(), provider("chat"));
        let router = ConfigRouter::new(providers);

        assert!(router.resolve(&request("gpt-4o"), ApiFormat::Chat).await.is_err());
    }
}
