//! Registry of in-flight streams.
//!
//! One conversation may have at most one concurrent stream. The registry is
//! the only mutable state shared across runs: a single coarse mutex over a
//! map, which is plenty at human-user contention levels.
//!
//! Removal is exactly-once by construction — `begin` hands back a guard
//! whose `Drop` removes the entry, so every exit path (normal completion,
//! error, cancellation, panic) releases the conversation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tutorkit_core::message::ConversationId;
use tutorkit_core::RegistryError;

/// One in-flight stream's registry entry.
#[derive(Clone, Debug)]
pub struct ActiveStreamHandle {
    pub conversation_id: ConversationId,
    pub started_at: DateTime<Utc>,
    token: CancellationToken,
}

/// Concurrency-safe table of conversation id → cancellation handle.
#[derive(Default, Debug)]
pub struct ActiveStreamRegistry {
    streams: Mutex<HashMap<ConversationId, ActiveStreamHandle>>,
}

impl ActiveStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, ActiveStreamHandle>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a conversation for streaming.
    ///
    /// Fails if the conversation already has an active stream. On success
    /// the returned guard owns the entry: dropping it removes the entry.
    pub fn begin(
        self: &Arc<Self>,
        conversation_id: &ConversationId,
    ) -> Result<ActiveStreamGuard, RegistryError> {
        let mut streams = self.lock();

        if streams.contains_key(conversation_id) {
            return Err(RegistryError::ConversationAlreadyStreaming(
                conversation_id.to_string(),
            ));
        }

        let token = CancellationToken::new();
        streams.insert(
            conversation_id.clone(),
            ActiveStreamHandle {
                conversation_id: conversation_id.clone(),
                started_at: Utc::now(),
                token: token.clone(),
            },
        );

        debug!(conversation_id = %conversation_id, "Stream registered");

        Ok(ActiveStreamGuard {
            registry: Arc::clone(self),
            conversation_id: conversation_id.clone(),
            token,
        })
    }

    /// Signal cancellation of a conversation's active stream.
    ///
    /// The entry stays in the table until the run observes the signal and
    /// its guard is dropped.
    pub fn cancel(&self, conversation_id: &ConversationId) -> Result<(), RegistryError> {
        let streams = self.lock();
        match streams.get(conversation_id) {
            Some(handle) => {
                debug!(conversation_id = %conversation_id, "Cancellation requested");
                handle.token.cancel();
                Ok(())
            }
            None => Err(RegistryError::NotStreaming(conversation_id.to_string())),
        }
    }

    /// Whether a conversation currently has an in-flight stream.
    pub fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.lock().contains_key(conversation_id)
    }

    /// Number of in-flight streams.
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Remove an entry. Idempotent — called from the guard's `Drop`.
    fn end(&self, conversation_id: &ConversationId) {
        if self.lock().remove(conversation_id).is_some() {
            debug!(conversation_id = %conversation_id, "Stream released");
        }
    }
}

/// Scoped claim on a conversation's stream slot.
#[derive(Debug)]
pub struct ActiveStreamGuard {
    registry: Arc<ActiveStreamRegistry>,
    conversation_id: ConversationId,
    token: CancellationToken,
}

impl ActiveStreamGuard {
    /// The cancellation token for this run. Cloning is cheap; the engine
    /// observes it at every suspension point.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        self.registry.end(&self.conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_claims_slot() {
        let registry = Arc::new(ActiveStreamRegistry::new());
        let id = ConversationId::from("conv-1");

        let guard = registry.begin(&id).unwrap();
        assert!(registry.is_active(&id));
        assert_eq!(registry.active_count(), 1);
        assert_eq!(guard.conversation_id().to_string(), "conv-1");
    }

    #[test]
    fn duplicate_begin_fails() {
        let registry = Arc::new(ActiveStreamRegistry::new());
        let id = ConversationId::from("conv-1");

        let _guard = registry.begin(&id).unwrap();
        let err = registry.begin(&id).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::ConversationAlreadyStreaming(_)
        ));
    }

    #[test]
    fn drop_releases_slot() {
        let registry = Arc::new(ActiveStreamRegistry::new());
        let id = ConversationId::from("conv-1");

        {
            let _guard = registry.begin(&id).unwrap();
            assert!(registry.is_active(&id));
        }
        assert!(!registry.is_active(&id));

        // Re-begin succeeds after release
        let _guard = registry.begin(&id).unwrap();
        assert!(registry.is_active(&id));
    }

    #[test]
    fn cancel_fires_token_but_keeps_entry() {
        let registry = Arc::new(ActiveStreamRegistry::new());
        let id = ConversationId::from("conv-1");

        let guard = registry.begin(&id).unwrap();
        let token = guard.token();
        assert!(!token.is_cancelled());

        registry.cancel(&id).unwrap();
        assert!(token.is_cancelled());
        // Entry removal is the guard's job, not cancel's
        assert!(registry.is_active(&id));
    }

    #[test]
    fn cancel_unknown_conversation() {
        let registry = Arc::new(ActiveStreamRegistry::new());
        let err = registry.cancel(&ConversationId::from("ghost")).unwrap_err();
        assert!(matches!(err, RegistryError::NotStreaming(_)));
    }

    #[test]
    fn independent_conversations_coexist() {
        let registry = Arc::new(ActiveStreamRegistry::new());
        let _a = registry.begin(&ConversationId::from("a")).unwrap();
        let _b = registry.begin(&ConversationId::from("b")).unwrap();
        assert_eq!(registry.active_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_begin_admits_exactly_one() {
        let registry = Arc::new(ActiveStreamRegistry::new());
        let id = ConversationId::from("contested");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                registry.begin(&id).map(|g| {
                    // Hold the claim briefly so the others collide
                    std::mem::forget(g);
                })
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}
