//! The unified intermediate representation: the single contract every
//! protocol transformer produces and consumes.
//!
//! Keep this module free of provider-specific fields. Anything a single
//! vendor needs (Anthropic's `cache_control`, Gemini's `thoughtSignature`) is
//! carried as an opaque pass-through value, never as a typed field here.

mod chunk;
mod message;
mod request;
mod response;
mod usage;

pub use chunk::{IrChunk, IrDelta, IrThinkingDelta, IrToolCallDelta};
pub use message::{IrContent, IrContentPart, IrImageSource, IrMessage, IrRole, IrThinking, IrToolCall};
pub use request::{IrReasoning, IrReasoningEffort, IrRequest, IrResponseFormat, IrToolChoice, IrToolDef};
pub use response::{IrCitation, IrFinishReason, IrResponse};
pub use usage::IrUsage;
