//! Hands an [`ObservedUsage`] snapshot to a [`UsageSink`] exactly once, on
//! whichever path the stream actually ends on.
//!
//! Grounded on the teacher's `telemetry::chat::metrics::{Recorder,
//! StreamWrapper}` pair: the recording state lives behind an `Option` field
//! that is dropped either explicitly (stream ran to completion) or implicitly
//! (the wrapper itself got dropped — a client disconnect or cancellation) —
//! `Drop` does the recording either way, so the disconnect case needs no
//! separate handling.

use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures::Stream;
use pin_project::pin_project;

use super::observer::ObservedUsage;
use crate::{
    error::Result,
    interfaces::{RequestStatus, UsageRecord, UsageSink},
    ir::IrChunk,
};

struct PendingRecord {
    state: Arc<Mutex<ObservedUsage>>,
    sink: Arc<dyn UsageSink>,
    request_id: Option<String>,
    provider: String,
    model: String,
    status: RequestStatus,
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        let guard = self.state.lock().expect("observer mutex poisoned");
        let record = UsageRecord {
            request_id: self.request_id.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            usage: guard.usage,
            ttft: guard.ttft,
            status: self.status,
        };
        drop(guard);

        let sink = self.sink.clone();
        tokio::spawn(async move { sink.record(record).await });
    }
}

/// Wraps an IR chunk stream, recording usage to `sink` the moment the stream
/// ends. If it ends naturally the record carries [`RequestStatus::Completed`];
/// if this wrapper is dropped before that (client disconnect, cancellation)
/// the record carries [`RequestStatus::ClientDisconnect`] with whatever
/// partial usage had accumulated.
#[pin_project]
pub struct RecordUsageOnEnd<S> {
    #[pin]
    inner: S,
    pending: Option<PendingRecord>,
}

#[allow(clippy::too_many_arguments)]
pub fn record_usage_on_end<S>(
    inner: S,
    state: Arc<Mutex<ObservedUsage>>,
    sink: Arc<dyn UsageSink>,
    request_id: Option<String>,
    provider: String,
    model: String,
) -> RecordUsageOnEnd<S>
where
    S: Stream<Item = Result<IrChunk>>,
{
    RecordUsageOnEnd {
        inner,
        pending: Some(PendingRecord {
            state,
            sink,
            request_id,
            provider,
            model,
            status: RequestStatus::ClientDisconnect,
        }),
    }
}

impl<S: Stream<Item = Result<IrChunk>>> Stream for RecordUsageOnEnd<S> {
    type Item = Result<IrChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(None) => {
                if let Some(mut pending) = this.pending.take() {
                    pending.status = RequestStatus::Completed;
                }
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use async_trait::async_trait;
    use futures::StreamExt;
    use tokio::sync::mpsc;

    use super::*;
    use crate::stream::observer::observe;

    struct ChannelSink(mpsc::UnboundedSender<UsageRecord>);

    #[async_trait]
    impl UsageSink for ChannelSink {
        async fn record(&self, record: UsageRecord) {
            let _ = self.0.send(record);
        }
    }

    #[tokio::test]
    async fn completed_stream_records_completed_status() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn UsageSink> = Arc::new(ChannelSink(tx));

        let chunks = futures::stream::iter(vec![Ok(IrChunk::default())]);
        let (observed, state) = observe(Instant::now(), chunks);
        let wrapped = record_usage_on_end(observed, state, sink, None, "openai".to_string(), "gpt-4o".to_string());

        let items: Vec<_> = wrapped.collect().await;
        assert_eq!(items.len(), 1);

        let record = rx.recv().await.expect("record sent");
        assert_eq!(record.status, RequestStatus::Completed);
    }

    #[tokio::test]
    async fn dropped_stream_records_disconnect_status() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn UsageSink> = Arc::new(ChannelSink(tx));

        let chunks = futures::stream::pending::<Result<IrChunk>>();
        let (observed, state) = observe(Instant::now(), chunks);
        let wrapped = record_usage_on_end(observed, state, sink, None, "openai".to_string(), "gpt-4o".to_string());

        drop(wrapped);

        let record = rx.recv().await.expect("record sent");
        assert_eq!(record.status, RequestStatus::ClientDisconnect);
    }
}
