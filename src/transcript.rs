//! Conversation transcript and message types
//!
//! The transcript is append-only with one exception: while a response is
//! streaming in, the trailing bot message accepts content mutation through
//! `append_delta`/`set_content` until `finalize` freezes it. The in-flight
//! message is tracked as an explicit slot rather than by list position, so
//! the "at most one in-flight, always last" invariant is enforced here and
//! not by caller convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Bot,
}

/// Source reference attached to a completed bot message.
///
/// The atomic collaborator returns a bare context string, so `url` is
/// optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Citation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: None,
        }
    }

    #[allow(dead_code)] // Constructor for API completeness
    pub fn with_url(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: Some(url.into()),
        }
    }
}

/// One utterance in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            citations: Vec::new(),
        }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            content: content.into(),
            timestamp: Utc::now(),
            citations: Vec::new(),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("a bot message is already receiving a response")]
    InvalidState,
    #[error("no in-flight bot message to mutate")]
    NotInFlight,
    #[error("no in-flight bot message to finalize")]
    NothingInFlight,
}

/// Ordered sequence of messages; insertion order is chronological order.
///
/// Invariant: at most one message is in flight at any time, and when one
/// exists it is the last element.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    in_flight: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frozen message (user input, a completed bot message, or a
    /// row loaded from storage). Rejected while a response is in flight:
    /// the in-flight message must stay last.
    pub fn append(&mut self, message: Message) -> Result<(), TranscriptError> {
        if self.in_flight.is_some() {
            return Err(TranscriptError::InvalidState);
        }
        self.messages.push(message);
        Ok(())
    }

    /// Append an empty bot message and mark it in flight.
    pub fn append_placeholder(&mut self) -> Result<(), TranscriptError> {
        if self.in_flight.is_some() {
            return Err(TranscriptError::InvalidState);
        }
        self.messages.push(Message::bot(String::new()));
        self.in_flight = Some(self.messages.len() - 1);
        Ok(())
    }

    /// Append a streamed fragment to the in-flight message.
    pub fn append_delta(&mut self, delta: &str) -> Result<(), TranscriptError> {
        let idx = self.in_flight.ok_or(TranscriptError::NotInFlight)?;
        self.messages[idx].content.push_str(delta);
        Ok(())
    }

    /// Replace the in-flight message content wholesale (atomic responses and
    /// the failure path).
    pub fn set_content(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        let idx = self.in_flight.ok_or(TranscriptError::NotInFlight)?;
        self.messages[idx].content = content.into();
        Ok(())
    }

    /// Freeze the in-flight message, optionally attaching citations.
    /// Returns the finalized message.
    pub fn finalize(&mut self, citations: Vec<Citation>) -> Result<&Message, TranscriptError> {
        let idx = self.in_flight.take().ok_or(TranscriptError::NothingInFlight)?;
        self.messages[idx].citations = citations;
        Ok(&self.messages[idx])
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    #[allow(dead_code)] // Read by UI layers; exercised in tests
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[allow(dead_code)] // Read by UI layers; exercised in tests
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
