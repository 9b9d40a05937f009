//! Per-request context extracted from inbound HTTP headers.
//!
//! Grounded on the teacher's request-context extraction: a thin struct pulled
//! once at the edge and threaded through the handler, rather than
//! re-extracting headers at each layer.

use fastrace::{Span, collector::SpanContext};
use http::HeaderMap;

/// Context carried alongside an [`crate::ir::IrRequest`] for the lifetime of
/// one HTTP call. Fields here are either used directly by the core (tracing)
/// or passed through opaquely for an external collaborator to interpret
/// (`byok_api_key` is never read by the core itself).
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    /// Bring-your-own-key header override (`X-Provider-Api-Key`). The core
    /// does not interpret this; an `AuthBroker` implementation may.
    pub byok_api_key: Option<String>,
    pub parent_trace_header: Option<String>,
}

impl RequestContext {
    /// Creates a span for this request, rooted in the W3C traceparent it
    /// arrived with if one was present, otherwise a fresh root context.
    /// Exported unconditionally (§A.5); whether it is actually sampled and
    /// exported anywhere is a build-feature concern this crate doesn't gate on.
    pub fn new_span(&self, name: &'static str) -> Span {
        match self.parent_trace_header.as_deref().and_then(SpanContext::decode_w3c_traceparent) {
            Some(parent) => Span::root(name, parent),
            None => Span::root(name, SpanContext::random()),
        }
    }
}

const BYOK_HEADER: &str = "x-provider-api-key";
const TRACEPARENT_HEADER: &str = "traceparent";

pub fn extract_context(headers: &HeaderMap) -> RequestContext {
    RequestContext {
        request_id: uuid::Uuid::new_v4().to_string(),
        byok_api_key: headers
            .get(BYOK_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        parent_trace_header: headers
            .get(TRACEPARENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}
