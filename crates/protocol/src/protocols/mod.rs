//! One module per wire format, each implementing [`crate::transformer::Transformer`].

pub mod chat;
pub mod gemini;
pub mod messages;
pub mod responses;

use crate::transformer::{ApiFormat, Transformer};

/// Resolves the stateless transformer for a wire format.
pub fn transformer_for(format: ApiFormat) -> &'static dyn Transformer {
    match format {
        ApiFormat::Chat => &chat::ChatTransformer,
        ApiFormat::Messages => &messages::MessagesTransformer,
        ApiFormat::Gemini => &gemini::GeminiTransformer,
        ApiFormat::Responses => &responses::ResponsesTransformer,
    }
}
