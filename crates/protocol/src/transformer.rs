//! The capability set every protocol transformer implements (§4.1).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    error::Result,
    ir::{IrChunk, IrRequest, IrResponse, IrUsage},
};

/// A built, provider-ready request: where to send it and what to send.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    /// Path appended to the provider base URL. Produced by `get_endpoint` when
    /// a transformer needs the request shape to choose it (Gemini embeds the
    /// model and streaming mode in the URL); otherwise a fixed default.
    pub path: String,
    pub body: serde_json::Value,
}

/// Byte stream of raw upstream (or client) SSE/chunked bytes.
pub type ByteStream = BoxStream<'static, std::io::Result<bytes::Bytes>>;
/// Stream of IR chunks, one per upstream event (lazy, single-pass).
pub type ChunkStream = BoxStream<'static, Result<IrChunk>>;

/// The six operations plus `extractUsage` that every wire-format transformer
/// provides (§4.1). A transformer is stateless; any per-stream state lives in
/// the stream-specific helper it returns from `transform_stream`/`format_stream`.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Parses raw client bytes for this protocol into the IR. Fails with
    /// `MalformedRequest` on a structural violation of the protocol it claims.
    fn parse_request(&self, raw: &[u8]) -> Result<IrRequest>;

    /// Builds a provider payload from an IR request. Only fails on an
    /// internal invariant violation; never on valid IR.
    fn build_request(&self, request: &IrRequest) -> Result<BuiltRequest>;

    /// Endpoint path override for requests whose URL depends on the request
    /// shape (Gemini). Transformers for which the path is fixed don't need
    /// to override this; the default delegates to `BuiltRequest::path`.
    fn get_endpoint(&self, built: &BuiltRequest) -> String {
        built.path.clone()
    }

    /// Converts one complete provider reply into an IR response.
    fn transform_response(&self, body: &[u8]) -> Result<IrResponse>;

    /// Renders an IR response back into this protocol's client-facing JSON.
    fn format_response(&self, response: &IrResponse) -> Result<serde_json::Value>;

    /// Wraps a raw upstream byte stream into a lazy, stateful stream of IR chunks.
    fn transform_stream(&self, upstream: ByteStream) -> ChunkStream;

    /// Wraps a lazy IR chunk stream into this protocol's client-facing byte stream.
    fn format_stream(&self, chunks: ChunkStream) -> ByteStream;

    /// Extracts a partial usage record from one raw SSE `data:` payload,
    /// without disturbing any stream framing state. Pure and stateless; used
    /// by the observer in bypass mode (§4.7).
    fn extract_usage(&self, data: &[u8]) -> Option<IrUsage>;
}

/// The four wire formats the core understands (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    Chat,
    Messages,
    Gemini,
    Responses,
}
