//! Mock implementations for testing
//!
//! These mocks enable exercising the executor without real I/O.

use crate::completion::{CompletionRequest, CompletionService, ResponseEvent, ResponseStream};
use crate::runtime::traits::MessageStore;
use crate::transcript::{Citation, Message, Role};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

// ============================================================================
// Mock Completion Service
// ============================================================================

/// Completion service that plays back queued event scripts.
///
/// Each request consumes one script; with none queued the stream closes
/// immediately, which the runtime treats as a dead collaborator.
#[derive(Default)]
pub struct MockCompletionService {
    scripts: Mutex<VecDeque<Vec<ResponseEvent>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the events one request will receive, in order
    pub fn queue_script(&self, events: Vec<ResponseEvent>) {
        self.scripts.lock().unwrap().push_back(events);
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn request(&self, request: &CompletionRequest) -> ResponseStream {
        self.requests.lock().unwrap().push(request.clone());
        let events = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

// ============================================================================
// Silent Completion Service (for timeout testing)
// ============================================================================

/// Completion service that never answers; the stream stays open forever
#[derive(Default)]
pub struct SilentCompletionService {
    held: Mutex<Vec<mpsc::Sender<ResponseEvent>>>,
}

impl SilentCompletionService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompletionService for SilentCompletionService {
    async fn request(&self, _request: &CompletionRequest) -> ResponseStream {
        let (tx, rx) = mpsc::channel(1);
        // Keep the sender alive so the stream never closes.
        self.held.lock().unwrap().push(tx);
        rx
    }
}

// ============================================================================
// Mock Message Store
// ============================================================================

/// In-memory message store recording every write
#[derive(Default)]
pub struct MockMessageStore {
    conversations: Mutex<Vec<(String, String)>>,
    messages: Mutex<Vec<(String, Role, String, Vec<Citation>)>>,
    seeded: Mutex<HashMap<String, Vec<Message>>>,
}

impl MockMessageStore {
    /// Titles of conversations created through the store, in order
    pub fn conversation_titles(&self) -> Vec<String> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .map(|(_, title)| title.clone())
            .collect()
    }

    /// Every persisted message as (conversation, role, content, citations)
    pub fn recorded_messages(&self) -> Vec<(String, Role, String, Vec<Citation>)> {
        self.messages.lock().unwrap().clone()
    }

    /// Pre-populate a conversation for hydration tests
    pub fn seed_conversation(&self, id: &str, messages: Vec<Message>) {
        self.seeded
            .lock()
            .unwrap()
            .insert(id.to_string(), messages);
    }
}

#[async_trait]
impl MessageStore for MockMessageStore {
    async fn create_conversation(&self, title: &str) -> Result<String, String> {
        let mut conversations = self.conversations.lock().unwrap();
        let id = format!("conv-{}", conversations.len() + 1);
        conversations.push((id.clone(), title.to_string()));
        Ok(id)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        citations: &[Citation],
    ) -> Result<(), String> {
        self.messages.lock().unwrap().push((
            conversation_id.to_string(),
            role,
            content.to_string(),
            citations.to_vec(),
        ));
        Ok(())
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, String> {
        Ok(self
            .seeded
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}
