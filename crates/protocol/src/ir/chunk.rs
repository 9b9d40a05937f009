use serde::{Deserialize, Serialize};

use crate::ir::{response::IrFinishReason, usage::IrUsage};

/// One unit of an IR stream: a delta, a terminal frame, or a usage-only frame.
///
/// Chunks are produced lazily and consumed exactly once; the pipeline never
/// needs random access or replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrChunk {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created: Option<i64>,
    pub delta: IrDelta,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finish_reason: Option<IrFinishReason>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usage: Option<IrUsage>,
}

impl IrChunk {
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// The subset of a message that changed in this chunk. Every field is
/// optional; a chunk may set any combination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrDelta {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<super::message::IrRole>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thinking: Option<IrThinkingDelta>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<IrToolCallDelta>,
}

impl IrDelta {
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.content.is_none()
            && self.reasoning_content.is_none()
            && self.thinking.is_none()
            && self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrThinkingDelta {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
}

/// A fragment of a single tool call, ordered by `index` within the message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// Fragment of the arguments string; callers must concatenate fragments
    /// in arrival order to recover the full JSON string.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub arguments: Option<String>,
}
