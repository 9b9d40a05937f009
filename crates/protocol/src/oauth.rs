//! OAuth adapter (§2, §9) — the non-key-auth path.
//!
//! A subscription (OAuth) session talks to the provider through that
//! vendor's own session SDK rather than a bearer-token REST call; the wire
//! shape underneath is still one of the formats in [`crate::protocols`], so
//! this module is a thin seam rather than a fifth transformer. The only
//! logic that belongs in the core proper (the rest is the external
//! `OAuthProvider` the caller supplies) is the tool-name proxying required
//! to keep client tool names from colliding with names reserved by the
//! external agent framework the OAuth session runs inside.

use async_trait::async_trait;
use futures::StreamExt;

use crate::{
    error::Result,
    ir::{IrChunk, IrRequest, IrToolDef},
    protocols,
    transformer::{ApiFormat, ByteStream, ChunkStream},
};

/// The namespace prefix applied to every tool name before it crosses into an
/// OAuth session's external agent framework.
const TOOL_NAME_PREFIX: &str = "proxy_";

/// Prefixes a tool name for the OAuth path. Idempotent: a name that already
/// carries the prefix is returned unchanged, so repeated application (e.g.
/// re-proxying a tool definition that survived a round trip) is a no-op.
pub fn proxy_claude_code_tool_name(name: &str) -> String {
    if name.starts_with(TOOL_NAME_PREFIX) {
        name.to_string()
    } else {
        format!("{TOOL_NAME_PREFIX}{name}")
    }
}

/// Inverse of [`proxy_claude_code_tool_name`], applied to tool calls the
/// session SDK hands back before they reach the client.
pub fn unproxy_claude_code_tool_name(name: &str) -> String {
    name.strip_prefix(TOOL_NAME_PREFIX).unwrap_or(name).to_string()
}

fn proxy_request_tool_names(request: &mut IrRequest) {
    for tool in &mut request.tools {
        tool.name = proxy_claude_code_tool_name(&tool.name);
    }
    for message in &mut request.messages {
        for tool_call in &mut message.tool_calls {
            tool_call.name = proxy_claude_code_tool_name(&tool_call.name);
        }
    }
}

fn unproxy_chunk_tool_names(mut chunk: IrChunk) -> IrChunk {
    for tool_call in &mut chunk.delta.tool_calls {
        if let Some(name) = &tool_call.name {
            tool_call.name = Some(unproxy_claude_code_tool_name(name));
        }
    }
    chunk
}

/// A per-session provider SDK the OAuth adapter drives. Implementations wrap
/// whatever session/browser-token machinery a given provider's subscription
/// auth requires; the core only needs the raw SSE bytes back, in the wire
/// shape declared by [`OAuthProvider::format`].
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// The wire format this session speaks, so the adapter can reuse the
    /// matching [`crate::transformer::Transformer`] for stream decoding.
    fn format(&self) -> ApiFormat;

    /// Issues the call and returns the raw upstream byte stream.
    async fn call(&self, request: &IrRequest) -> Result<ByteStream>;
}

/// Wraps an [`OAuthProvider`] with tool-name proxying and stream decoding,
/// producing the same `ChunkStream` contract a key-auth upstream call would.
pub struct OAuthAdapter<P> {
    provider: P,
}

impl<P: OAuthProvider> OAuthAdapter<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub async fn stream(&self, request: &IrRequest) -> Result<ChunkStream> {
        let mut proxied = request.clone();
        proxy_request_tool_names(&mut proxied);

        let bytes = self.provider.call(&proxied).await?;
        let chunks = protocols::transformer_for(self.provider.format()).transform_stream(bytes);

        Ok(Box::pin(chunks.map(|result| result.map(unproxy_chunk_tool_names))))
    }
}

/// Strips proxy framing from a tool declaration list before it is shown back
/// to anything outside the OAuth boundary (e.g. a usage log).
pub fn unproxy_tool_defs(tools: &[IrToolDef]) -> Vec<IrToolDef> {
    tools
        .iter()
        .cloned()
        .map(|mut tool| {
            tool.name = unproxy_claude_code_tool_name(&tool.name);
            tool
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxying_is_idempotent() {
        let once = proxy_claude_code_tool_name("search");
        let twice = proxy_claude_code_tool_name(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "proxy_search");
    }

    #[test]
    fn unproxy_reverses_proxy() {
        let proxied = proxy_claude_code_tool_name("search");
        assert_eq!(unproxy_claude_code_tool_name(&proxied), "search");
    }

    #[test]
    fn unproxying_an_unprefixed_name_is_a_no_op() {
        assert_eq!(unproxy_claude_code_tool_name("search"), "search");
    }
}
