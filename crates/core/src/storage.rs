//! Conversation persistence interface.
//!
//! Persistence is an external collaborator — the orchestrator only needs an
//! append/read capability. The in-memory implementation backs tests and
//! single-process deployments.

use crate::error::StorageError;
use crate::message::{Conversation, ConversationId, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Append/read access to persisted conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one message to a conversation, creating it if absent.
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> std::result::Result<(), StorageError>;

    /// Load a conversation's ordered messages.
    async fn load_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> std::result::Result<Conversation, StorageError>;
}

/// In-memory conversation store.
pub struct InMemoryStore {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> std::result::Result<(), StorageError> {
        let mut conversations = self
            .conversations
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        conversations
            .entry(conversation_id.clone())
            .or_insert_with(|| Conversation::with_id(conversation_id.clone()))
            .push(message);
        Ok(())
    }

    async fn load_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> std::result::Result<Conversation, StorageError> {
        let conversations = self
            .conversations
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(conversation_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_load() {
        let store = InMemoryStore::new();
        let id = ConversationId::from("conv-1");

        store
            .append_message(&id, Message::user("hello"))
            .await
            .unwrap();
        store
            .append_message(&id, Message::assistant("hi there"))
            .await
            .unwrap();

        let conv = store.load_conversation(&id).await.unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].content, "hello");
        assert_eq!(conv.messages[1].content, "hi there");
    }

    #[tokio::test]
    async fn load_missing_conversation() {
        let store = InMemoryStore::new();
        let err = store
            .load_conversation(&ConversationId::from("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
