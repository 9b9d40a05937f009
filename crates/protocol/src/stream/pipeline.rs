//! The SPSC stream-edge primitive used between pipeline stages (§5).
//!
//! Every stage — parser, transformer, observer, formatter, client writer —
//! is connected by an ordinary `futures::Stream` combinator chain rather than
//! by buffering into an intermediate collection: polling a `Stream` only
//! pulls the next item when the consumer is ready, which is what gives the
//! pipeline its backpressure for free. This module exists for the one case
//! that needs an explicit channel: the bypass tee's drain branch
//! (`stream::observer::tee_for_bypass`), which legitimately needs two
//! independent readers of one upstream.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Wraps a stream with a cancellation signal: once cancelled, the stream ends
/// immediately regardless of upstream readiness, releasing any pull-parser
/// state (§5's cancellation/timeouts requirement).
pub fn cancellable<S, T>(stream: S, token: CancellationToken) -> impl Stream<Item = T> + Send + 'static
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    stream.take_until(async move { token.cancelled().await })
}

/// A bounded single-producer/single-consumer channel used to hand a finite
/// chunk sequence from one synchronous producer task to a stream consumer
/// without ever buffering an unbounded backlog.
pub fn spsc<T: Send + 'static>(capacity: usize) -> (mpsc::Sender<T>, impl Stream<Item = T> + Send + 'static) {
    let (tx, rx) = mpsc::channel(capacity);
    let stream = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
    (tx, stream)
}
