//! The iteration engine — the think/act/observe loop at the center of the
//! orchestrator.
//!
//! Each iteration performs exactly one provider call. If the response
//! carries tool calls, every one of them is dispatched and its result
//! appended to the conversation before the next provider call; if not, the
//! response is the final answer. The loop is bounded: reaching the bound
//! while the model still wants tools terminates the run with a
//! `max_iterations_exceeded` error event, with everything streamed so far
//! already delivered.
//!
//! Cancellation is cooperative — the token is checked at every suspension
//! point (provider connect, chunk receive, tool invoke). A tool call that
//! was already dispatched when cancellation arrives finishes in the
//! background and its result is discarded.

use crate::multiplexer::EventSink;
use crate::stream_event::StreamEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tutorkit_core::error::{EngineError, ProviderError};
use tutorkit_core::message::{Conversation, Message, MessageToolCall};
use tutorkit_core::provider::{Provider, ProviderRequest, ToolDefinition};
use tutorkit_core::storage::ConversationStore;
use tutorkit_core::tool::{next_tool_call_id, ToolCall};
use tutorkit_tools::ToolInvoker;

/// Engine tunables, validated upstream by `tutorkit-config`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum think/act/observe iterations per run
    pub max_iterations: u32,

    /// Per-provider-call timeout (connect and per-chunk idle)
    pub provider_timeout: Duration,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens per LLM response
    pub max_tokens: Option<u32>,

    /// Fraction of existing history marked cacheable for providers that
    /// support prompt caching; 0.0 disables the hint
    pub cache_prefix_fraction: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            provider_timeout: Duration::from_secs(120),
            temperature: 0.7,
            max_tokens: Some(4096),
            cache_prefix_fraction: 0.8,
        }
    }
}

impl EngineConfig {
    /// Build from validated settings.
    pub fn from_settings(settings: &tutorkit_config::EngineSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            provider_timeout: Duration::from_secs(settings.provider_timeout_secs),
            temperature: settings.temperature,
            max_tokens: Some(settings.max_tokens),
            cache_prefix_fraction: settings.cache_prefix_fraction,
        }
    }
}

/// Drives one conversation's think/act/observe loop against a provider.
pub struct IterationEngine {
    provider: Arc<dyn Provider>,
    model: String,
    tools: ToolInvoker,
    config: EngineConfig,
    store: Option<Arc<dyn ConversationStore>>,
}

impl IterationEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: ToolInvoker,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            tools,
            config,
            store: None,
        }
    }

    /// Mirror every appended message into a conversation store.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Execute the run, emitting the full event sequence into the sink.
    ///
    /// The engine owns its conversation view for the duration of the run and
    /// only ever appends to it. Always ends the stream with `metrics`
    /// followed by a terminal `done` or `error` event.
    pub async fn run(
        &self,
        mut conversation: Conversation,
        cancel: CancellationToken,
        mut sink: EventSink,
    ) {
        let terminal = self.drive(&mut conversation, &cancel, &mut sink).await;
        sink.finish(terminal).await;
    }

    /// The loop proper. Returns the terminal event for the run.
    async fn drive(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
        sink: &mut EventSink,
    ) -> StreamEvent {
        info!(
            conversation_id = %conversation.id,
            model = %self.model,
            max_iterations = self.config.max_iterations,
            "Run starting"
        );

        sink.emit(StreamEvent::Start {
            conversation_id: conversation.id.to_string(),
            model: self.model.clone(),
        })
        .await;

        let tool_defs = self.tools.definitions().await;

        for index in 0..self.config.max_iterations {
            if cancel.is_cancelled() {
                return cancelled_event();
            }

            sink.emit(StreamEvent::IterationStart { index }).await;
            debug!(conversation_id = %conversation.id, iteration = index, "Thinking");

            // ── Thinking: one provider call, streamed ──
            let request = self.build_request(conversation, &tool_defs);

            let mut chunk_rx = tokio::select! {
                _ = cancel.cancelled() => return cancelled_event(),
                connect = tokio::time::timeout(
                    self.config.provider_timeout,
                    self.provider.stream(request),
                ) => match connect {
                    Err(_) => return provider_error_event(self.timeout_error()),
                    Ok(Err(e)) => return provider_error_event(e),
                    Ok(Ok(rx)) => rx,
                },
            };

            let mut content = String::new();
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();
            let mut saw_usage = false;

            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => return cancelled_event(),
                    recv = tokio::time::timeout(self.config.provider_timeout, chunk_rx.recv()) => {
                        match recv {
                            Err(_) => return provider_error_event(self.timeout_error()),
                            Ok(v) => v,
                        }
                    }
                };

                let Some(chunk_result) = received else { break };
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => return provider_error_event(e),
                };

                if let Some(text) = chunk.content.as_deref().filter(|t| !t.is_empty()) {
                    content.push_str(text);
                    sink.emit(StreamEvent::Delta {
                        content: text.to_string(),
                    })
                    .await;
                }

                if let Some(thinking) = chunk.thinking.as_deref().filter(|t| !t.is_empty()) {
                    sink.emit(StreamEvent::Thinking {
                        content: thinking.to_string(),
                    })
                    .await;
                }

                for tc in chunk.tool_calls {
                    merge_tool_call(&mut tool_calls, tc);
                }

                if let Some(usage) = chunk.usage {
                    sink.record_usage(usage);
                    saw_usage = true;
                }

                if chunk.done {
                    break;
                }
            }

            if !saw_usage {
                sink.record_completion_estimate(self.provider.count_tokens(&content));
            }

            // ── No tool calls: final answer ──
            if tool_calls.is_empty() {
                let message = Message::assistant(&content);
                self.append(conversation, message.clone()).await;
                sink.emit(StreamEvent::IterationEnd { index }).await;

                info!(
                    conversation_id = %conversation.id,
                    iterations = index + 1,
                    "Run completed"
                );
                return StreamEvent::Done { message };
            }

            // ── Acting: dispatch every tool call of this response ──
            // Provider ids are not guaranteed unique across backends, so
            // each call gets a process-wide id before dispatch.
            for tc in &mut tool_calls {
                tc.id = next_tool_call_id();
            }

            debug!(
                conversation_id = %conversation.id,
                iteration = index,
                tool_count = tool_calls.len(),
                "Acting"
            );

            let mut assistant = Message::assistant(&content);
            assistant.tool_calls = tool_calls.clone();
            self.append(conversation, assistant).await;

            for tc in &tool_calls {
                let arguments: serde_json::Value =
                    serde_json::from_str(&tc.arguments).unwrap_or_default();

                sink.emit(StreamEvent::ToolStart {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: arguments.clone(),
                })
                .await;

                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments,
                };

                sink.emit(StreamEvent::ToolExecuting { id: tc.id.clone() }).await;

                // Spawned so that cancellation leaves the invocation running
                // detached; its result is discarded, not awaited.
                let invoker = self.tools.clone();
                let mut task = tokio::spawn(async move { invoker.invoke(&call).await });

                let result = tokio::select! {
                    _ = cancel.cancelled() => return cancelled_event(),
                    joined = &mut task => match joined {
                        Ok(result) => result,
                        Err(e) => tutorkit_core::tool::ToolResult::error(
                            &tc.id,
                            format!("Error: tool task failed: {e}"),
                            0,
                        ),
                    },
                };

                sink.emit(StreamEvent::ToolResult {
                    id: result.call_id.clone(),
                    name: tc.name.clone(),
                    output: result.output.clone(),
                    success: result.success,
                    duration_ms: result.duration_ms,
                })
                .await;

                // ── Observing: the result becomes conversation data ──
                self.append(
                    conversation,
                    Message::tool_result(&result.call_id, &result.output),
                )
                .await;
            }

            sink.emit(StreamEvent::IterationEnd { index }).await;
        }

        // Bound reached while the model still wants tools
        warn!(
            conversation_id = %conversation.id,
            max_iterations = self.config.max_iterations,
            "Run hit iteration bound"
        );
        let err = EngineError::MaxIterationsExceeded {
            max_iterations: self.config.max_iterations,
        };
        StreamEvent::Error {
            kind: err.kind().into(),
            message: err.to_string(),
        }
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        tool_defs: &[ToolDefinition],
    ) -> ProviderRequest {
        let mut request = ProviderRequest::new(&self.model, conversation.messages.clone());
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;
        request.tools = tool_defs.to_vec();
        request.stream = true;
        request.cache_prefix_messages = self.cache_boundary(conversation.messages.len());
        request
    }

    /// How many leading messages to mark cacheable for this call.
    fn cache_boundary(&self, message_count: usize) -> Option<usize> {
        if self.config.cache_prefix_fraction <= 0.0 {
            return None;
        }
        let n = (message_count as f32 * self.config.cache_prefix_fraction).floor() as usize;
        (n > 0).then_some(n)
    }

    fn timeout_error(&self) -> ProviderError {
        ProviderError::Timeout {
            timeout_secs: self.config.provider_timeout.as_secs(),
        }
    }

    /// Append to the run's conversation view, mirroring into the store.
    ///
    /// Storage failures are logged and do not interrupt the run — the
    /// in-memory view stays authoritative until the run ends.
    async fn append(&self, conversation: &mut Conversation, message: Message) {
        if let Some(store) = &self.store {
            if let Err(e) = store.append_message(&conversation.id, message.clone()).await {
                warn!(
                    conversation_id = %conversation.id,
                    error = %e,
                    "Failed to persist message"
                );
            }
        }
        conversation.push(message);
    }
}

/// Merge a streamed tool-call fragment into the accumulated set.
///
/// Most adapters deliver complete calls in the final chunk, but a backend
/// may split one call's arguments across chunks sharing an id.
fn merge_tool_call(accumulated: &mut Vec<MessageToolCall>, incoming: MessageToolCall) {
    if let Some(existing) = accumulated.iter_mut().find(|t| t.id == incoming.id) {
        existing.arguments.push_str(&incoming.arguments);
    } else {
        accumulated.push(incoming);
    }
}

fn cancelled_event() -> StreamEvent {
    let err = EngineError::Cancelled;
    StreamEvent::Error {
        kind: err.kind().into(),
        message: err.to_string(),
    }
}

fn provider_error_event(err: ProviderError) -> StreamEvent {
    warn!(kind = err.kind(), error = %err, "Provider call failed");
    StreamEvent::Error {
        kind: err.kind().into(),
        message: err.to_string(),
    }
}
