//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::Database;
use crate::transcript::{Citation, Message, Role};
use async_trait::async_trait;

/// Storage for conversations and their messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create a conversation record, returning its ID
    async fn create_conversation(&self, title: &str) -> Result<String, String>;

    /// Append a message to a conversation
    async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        citations: &[Citation],
    ) -> Result<(), String>;

    /// Get all messages for a conversation in chronological order
    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for std::sync::Arc<T> {
    async fn create_conversation(&self, title: &str) -> Result<String, String> {
        (**self).create_conversation(title).await
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        citations: &[Citation],
    ) -> Result<(), String> {
        (**self)
            .add_message(conversation_id, role, content, citations)
            .await
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, String> {
        (**self).get_messages(conversation_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a MessageStore
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn inner(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl MessageStore for DatabaseStore {
    async fn create_conversation(&self, title: &str) -> Result<String, String> {
        self.db
            .create_conversation(title)
            .map(|c| c.id)
            .map_err(|e| e.to_string())
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        citations: &[Citation],
    ) -> Result<(), String> {
        self.db
            .add_message(conversation_id, role, content, citations)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, String> {
        self.db
            .get_messages(conversation_id)
            .map(|rows| {
                rows.into_iter()
                    .map(crate::db::StoredMessage::into_message)
                    .collect()
            })
            .map_err(|e| e.to_string())
    }
}
