use serde::{Deserialize, Serialize};

use crate::ir::{message::IrThinking, message::IrToolCall, usage::IrUsage};

/// Terminal reason a response or stream stopped, per §6.3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrFinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    /// A provider-specific value the IR does not model, passed through verbatim.
    #[serde(untagged)]
    Other(String),
}

/// A URL citation annotation attached to response text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrCitation {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    pub start_index: u32,
    pub end_index: u32,
}

/// A provider-neutral unary chat response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thinking: Option<IrThinking>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<IrToolCall>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finish_reason: Option<IrFinishReason>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub citations: Vec<IrCitation>,
    pub usage: IrUsage,
    /// Set when this response is a bypass pass-through: `raw_response` carries
    /// the untransformed upstream payload and every field above except `usage`
    /// is left at its default.
    #[serde(skip)]
    pub bypass: bool,
    #[serde(skip)]
    pub raw_response: Option<Vec<u8>>,
}
