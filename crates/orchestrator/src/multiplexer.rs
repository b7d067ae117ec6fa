//! Stream multiplexing — the ordered, backpressured event channel between
//! one run and its consumer.
//!
//! `EventSink` wraps a bounded mpsc sender. Emission awaits channel capacity,
//! so a stalled consumer pauses production instead of growing a buffer; a
//! disconnected consumer trips the run's cancellation token so the engine
//! unwinds at its next suspension point. The sink also accumulates the
//! run's aggregate metrics as events pass through it.

use crate::stream_event::{RunMetrics, StreamEvent};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tutorkit_core::provider::Usage;

/// Channel capacity per run. Small enough to bound memory, large enough to
/// absorb bursts of deltas between consumer reads.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The producing end of one run's event stream.
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    started: Instant,
    prompt_tokens: u32,
    completion_tokens: u32,
    iterations: u32,
    tool_calls: u32,
}

impl EventSink {
    /// Create a sink and its consumer half.
    pub fn channel(cancel: CancellationToken) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                tx,
                cancel,
                started: Instant::now(),
                prompt_tokens: 0,
                completion_tokens: 0,
                iterations: 0,
                tool_calls: 0,
            },
            rx,
        )
    }

    /// Emit one event, in production order.
    ///
    /// Suspends while the consumer is behind. If the consumer is gone the
    /// event is dropped on the floor and the run is told to cancel — there
    /// is nobody left to preserve ordering for.
    pub async fn emit(&mut self, event: StreamEvent) {
        match &event {
            StreamEvent::IterationStart { .. } => self.iterations += 1,
            StreamEvent::ToolStart { .. } => self.tool_calls += 1,
            _ => {}
        }

        if self.tx.send(event).await.is_err() {
            debug!("Event consumer disconnected; cancelling run");
            self.cancel.cancel();
        }
    }

    /// Record backend-reported token usage for one provider call.
    pub fn record_usage(&mut self, usage: Usage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
    }

    /// Record an estimated completion token count, for provider calls whose
    /// stream carried no usage data.
    pub fn record_completion_estimate(&mut self, tokens: usize) {
        self.completion_tokens += tokens as u32;
    }

    /// Aggregate statistics for the run so far.
    pub fn metrics(&self) -> RunMetrics {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let secs = duration_ms as f64 / 1000.0;
        let tokens_per_sec = if secs > 0.0 {
            self.completion_tokens as f64 / secs
        } else {
            0.0
        };

        RunMetrics {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            duration_ms,
            tokens_per_sec,
            iterations: self.iterations,
            tool_calls: self.tool_calls,
        }
    }

    /// Emit the metrics event followed by the given terminal event.
    ///
    /// Every run ends through here, so partial progress always flushes
    /// before the stream closes.
    pub async fn finish(mut self, terminal: StreamEvent) {
        let metrics = self.metrics();
        self.emit(StreamEvent::Metrics(metrics)).await;
        self.emit(terminal).await;
    }
}
