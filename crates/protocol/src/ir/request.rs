use serde::{Deserialize, Serialize};

use crate::ir::message::IrMessage;

/// A provider-neutral chat request, the common input to every `buildRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrRequest {
    /// Model name as resolved by the router; never a raw client-supplied alias
    /// by the time it reaches `buildRequest`.
    pub model: String,
    pub messages: Vec<IrMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<IrToolDef>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_choice: Option<IrToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_format: Option<IrResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reasoning: Option<IrReasoning>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
    /// Opaque request correlation id threaded through to logs and the usage
    /// sink. Never sent upstream.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    /// Caller-supplied fields the core does not model, preserved for round-tripping.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl IrRequest {
    /// The leading system message, if any. Per the data-model invariant there
    /// is at most one and, if present, it is first.
    pub fn system_message(&self) -> Option<&IrMessage> {
        self.messages.first().filter(|m| m.role == super::message::IrRole::System)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrToolDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Raw JSON schema, carried opaquely.
    pub parameters: serde_json::Value,
    /// OpenAI's "strict" function-calling flag, carried opaquely between
    /// formats that understand it (Chat, Responses) and ignored by those that don't.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrToolChoice {
    Auto,
    None,
    Required,
    Named(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IrResponseFormat {
    Text,
    JsonObject,
    JsonSchema { schema: serde_json::Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrReasoningEffort {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrReasoning {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub effort: Option<IrReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub enabled: bool,
}
