//! Transparent stream observer and the bypass tee (§4.7).

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use futures::{Stream, StreamExt};

use crate::{error::Result, ir::IrChunk, ir::IrUsage};

/// Accumulated observations about one stream, finalized once the stream ends
/// or the client disconnects.
#[derive(Debug, Default)]
pub struct ObservedUsage {
    pub usage: IrUsage,
    pub ttft: Option<Duration>,
    pub chunk_count: u64,
    pub disconnected: bool,
}

/// Wraps an IR chunk stream so that, for each chunk, any `usage` present is
/// folded into a running total and the wall-clock time-to-first-chunk is
/// recorded, then forwards the chunk unchanged. A transparent passthrough
/// inserted before the client encoder, never a content transform.
pub fn observe(
    start: Instant,
    chunks: impl Stream<Item = Result<IrChunk>> + Send + 'static,
) -> (impl Stream<Item = Result<IrChunk>> + Send + 'static, Arc<Mutex<ObservedUsage>>) {
    let state = Arc::new(Mutex::new(ObservedUsage::default()));
    let state_for_stream = state.clone();

    let observed = chunks.map(move |item| {
        let mut guard = state_for_stream.lock().expect("observer mutex poisoned");
        guard.chunk_count += 1;
        if guard.ttft.is_none() {
            guard.ttft = Some(start.elapsed());
        }
        if let Ok(chunk) = &item
            && let Some(usage) = chunk.usage
        {
            guard.usage = guard.usage + usage;
        }
        drop(guard);
        item
    });

    (observed, state)
}

/// Marks the observed record as having ended on a client disconnect, keeping
/// whatever partial usage/chunk-count had already accumulated (§4.7, §7).
pub fn finalize_on_disconnect(state: &Arc<Mutex<ObservedUsage>>) {
    state.lock().expect("observer mutex poisoned").disconnected = true;
}

/// Bypass tee: splits one upstream byte stream into a client-facing copy and
/// a non-blocking drain used only to extract usage via `extract_usage`. The
/// drain must never apply backpressure to the client branch — a slow or
/// absent consumer of the drain side must not stall bytes reaching the client.
pub fn tee_for_bypass(
    upstream: crate::transformer::ByteStream,
) -> (crate::transformer::ByteStream, tokio::sync::mpsc::UnboundedReceiver<bytes::Bytes>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let client_stream = upstream.map(move |item| {
        if let Ok(bytes) = &item {
            // Unbounded and non-blocking: a full or dropped receiver never
            // slows the client branch, matching the bypass contract in §4.7.
            let _ = tx.send(bytes.clone());
        }
        item
    });

    (Box::pin(client_stream), rx)
}
