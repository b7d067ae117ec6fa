//! The tutorkit conversation orchestrator.
//!
//! Turns a single chat request into a streaming, tool-using run:
//!
//! 1. **Resolve** the provider adapter for the conversation
//! 2. **Claim** the conversation in the active stream registry (at most one
//!    concurrent stream per conversation)
//! 3. **Drive** the think/act/observe loop — provider calls, tool
//!    invocations, observations — bounded by the configured iteration limit
//! 4. **Multiplex** everything into one ordered, backpressured
//!    [`StreamEvent`] sequence for the presentation layer
//!
//! Cancellation (explicit request or consumer disconnect) is observed
//! cooperatively at every suspension point, and the registry entry is
//! released exactly once on every exit path.

pub mod active;
pub mod engine;
pub mod multiplexer;
pub mod stream_event;

pub use active::{ActiveStreamGuard, ActiveStreamHandle, ActiveStreamRegistry};
pub use engine::{EngineConfig, IterationEngine};
pub use multiplexer::EventSink;
pub use stream_event::{RunMetrics, StreamEvent};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tutorkit_config::AppConfig;
use tutorkit_core::message::ConversationId;
use tutorkit_core::storage::ConversationStore;
use tutorkit_core::{Error, RegistryError};
use tutorkit_providers::{build_from_config, ProviderRegistry};
use tutorkit_tools::{default_local_backend, HttpToolBackend, ToolBackend, ToolInvoker};

/// One conversation's event stream, handed to the caller.
#[derive(Debug)]
pub struct RunStream {
    pub conversation_id: ConversationId,
    pub events: mpsc::Receiver<StreamEvent>,
}

/// The orchestrator — owns the provider registry, the tool invoker, and the
/// active stream registry, and spawns one engine task per run.
pub struct Orchestrator {
    config: AppConfig,
    providers: ProviderRegistry,
    streams: Arc<ActiveStreamRegistry>,
    tools: ToolInvoker,
    store: Arc<dyn ConversationStore>,
}

impl Orchestrator {
    /// Assemble an orchestrator from pre-built parts.
    pub fn new(
        config: AppConfig,
        providers: ProviderRegistry,
        tools: ToolInvoker,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            config,
            providers,
            streams: Arc::new(ActiveStreamRegistry::new()),
            tools,
            store,
        }
    }

    /// Build everything from validated configuration: provider adapters from
    /// the `[providers]` table, and the tool backend from `[tool_backend]`
    /// (HTTP when a URL is configured, in-process otherwise).
    pub fn from_config(config: AppConfig, store: Arc<dyn ConversationStore>) -> Self {
        let providers = build_from_config(&config);

        let backend: Arc<dyn ToolBackend> = match &config.tool_backend.url {
            Some(url) => Arc::new(HttpToolBackend::new(
                url,
                config.tool_backend.api_key.clone(),
            )),
            None => Arc::new(default_local_backend()),
        };
        let tools = ToolInvoker::new(
            backend,
            Duration::from_secs(config.engine.tool_timeout_secs),
        );

        Self::new(config, providers, tools, store)
    }

    /// Start a streaming run for a conversation.
    ///
    /// Fails before any event is produced when the provider is unknown, the
    /// conversation cannot be loaded, or the conversation already has an
    /// active stream. On success the engine task runs in the background and
    /// the returned receiver yields the ordered event sequence, ending with
    /// `metrics` and a terminal `done` or `error`.
    pub async fn stream_chat(
        &self,
        conversation_id: &ConversationId,
        provider_name: Option<&str>,
    ) -> Result<RunStream, Error> {
        let provider = match provider_name {
            Some(name) => self.providers.resolve(name)?,
            None => self.providers.default_provider()?,
        };
        let model = self.config.model_for(provider.name());

        let conversation = self.store.load_conversation(conversation_id).await?;

        let guard = self.streams.begin(conversation_id)?;
        let cancel = guard.token();
        let (sink, events) = EventSink::channel(cancel.clone());

        let engine = IterationEngine::new(
            provider,
            model,
            self.tools.clone(),
            EngineConfig::from_settings(&self.config.engine),
        )
        .with_store(Arc::clone(&self.store));

        info!(conversation_id = %conversation_id, "Spawning run");

        tokio::spawn(async move {
            // The guard lives for the whole run: dropping it on any exit
            // path — completion, error, cancellation, panic — releases the
            // conversation's stream slot exactly once.
            let _guard = guard;
            engine.run(conversation, cancel, sink).await;
        });

        Ok(RunStream {
            conversation_id: conversation_id.clone(),
            events,
        })
    }

    /// Request cancellation of a conversation's active stream.
    pub fn cancel(&self, conversation_id: &ConversationId) -> Result<(), RegistryError> {
        self.streams.cancel(conversation_id)
    }

    /// Whether a conversation currently has an in-flight stream.
    pub fn is_streaming(&self, conversation_id: &ConversationId) -> bool {
        self.streams.is_active(conversation_id)
    }

    /// Number of in-flight streams.
    pub fn active_streams(&self) -> usize {
        self.streams.active_count()
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        self.providers.list()
    }
}
