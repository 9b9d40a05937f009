//! SSE pull-parsing and framing helpers shared by every transformer.
//!
//! Parsing wraps `eventsource-stream`'s `Eventsource` adaptor, which already
//! gives per-event cancellation and reader-driven backpressure (§9's pipeline
//! requirements) over an arbitrary byte stream; transformers never implement
//! framing themselves.

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};

use crate::{error::GatewayError, transformer::ByteStream};

/// One parsed upstream SSE event: its (possibly empty) `event:` name and its
/// `data:` payload, already de-chunked and newline-joined by the underlying parser.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Wraps a raw byte stream into a stream of parsed SSE events, logging and
/// skipping (never propagating) any frame that fails to parse — upstream
/// protocol violations are contained at this stage per §7.
pub fn parse(upstream: ByteStream) -> impl Stream<Item = SseEvent> + Send + 'static {
    upstream
        .map(|res| res.map_err(std::io::Error::other))
        .eventsource()
        .filter_map(|res| async move {
            match res {
                Ok(event) => Some(SseEvent {
                    event: event.event,
                    data: event.data,
                }),
                Err(e) => {
                    log::warn!("upstream SSE frame could not be parsed: {e}");
                    None
                }
            }
        })
}

/// Formats one outgoing named SSE event: `event: <name>\ndata: <payload>\n\n`.
pub fn frame_named(event: &str, data: &str) -> Vec<u8> {
    format!("event: {event}\ndata: {data}\n\n").into_bytes()
}

/// Formats one outgoing anonymous SSE event: `data: <payload>\n\n`.
pub fn frame(data: &str) -> Vec<u8> {
    format!("data: {data}\n\n").into_bytes()
}

/// The `data: [DONE]\n\n` terminator OpenAI Chat streams end with.
pub fn done_frame() -> Vec<u8> {
    b"data: [DONE]\n\n".to_vec()
}

pub fn serialize_error(err: &GatewayError) -> String {
    sonic_rs::to_string(&serde_json::json!({ "error": err.to_string() })).unwrap_or_else(|_| "{}".to_string())
}
