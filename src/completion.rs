//! Completion collaborator abstraction
//!
//! Provides a common interface over the two observed delivery modes: a
//! plain HTTP endpoint answering atomically, and a token-streaming endpoint
//! emitting one fragment per server-sent event. Both feed the same tagged
//! event union so the reducer handles them through one code path.

mod http;
mod sse;

pub use http::HttpCompletionService;
pub use sse::{model_for_version, SseCompletionService, SseDecoder};

use crate::transcript::Citation;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// One outbound query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub query: String,
    /// Whether server-side conversation history should be consulted
    pub use_history: bool,
}

impl CompletionRequest {
    pub fn new(query: impl Into<String>, use_history: bool) -> Self {
        Self {
            query: query.into(),
            use_history,
        }
    }
}

/// Response delivery events, in arrival order.
///
/// `Atomic` and `Terminal` both close the exchange; `Fragment` keeps it
/// open. `Failed` closes it through the failure path.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// Complete answer delivered in one piece
    Atomic {
        text: String,
        citations: Vec<Citation>,
    },
    /// Incremental text delta
    Fragment { delta: String },
    /// End-of-stream marker, no payload
    Terminal,
    /// Transport or server failure reported by the collaborator
    Failed { error: CompletionError },
}

impl ResponseEvent {
    /// Whether this event ends the exchange
    pub fn is_closing(&self) -> bool {
        !matches!(self, ResponseEvent::Fragment { .. })
    }
}

/// Completion failure with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

/// Failure classification, used to pick the user-facing apology text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    /// Network failure, connection refused, unreadable body
    Transport,
    /// Non-success HTTP status
    Server { status: u16 },
    /// No response within the configured deadline
    Timeout,
    /// Response arrived but could not be understood
    Protocol,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Transport, message)
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Server { status }, message)
    }

    pub fn timeout(deadline: Duration) -> Self {
        Self::new(
            CompletionErrorKind::Timeout,
            format!("no response within {}s", deadline.as_secs()),
        )
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Protocol, message)
    }

    /// The fixed failure string shown in place of the answer
    pub fn user_facing_text(&self) -> String {
        match self.kind {
            CompletionErrorKind::Server { status } => format!(
                "Sorry, I encountered an error: {status}. Please try again."
            ),
            CompletionErrorKind::Transport | CompletionErrorKind::Timeout => {
                "Sorry, I couldn't connect to the server. Please check your connection and try again."
                    .to_string()
            }
            CompletionErrorKind::Protocol => {
                "Sorry, I couldn't read the server's response. Please try again.".to_string()
            }
        }
    }
}

/// Channel delivering response events onto the session's serialized loop
pub type ResponseStream = mpsc::Receiver<ResponseEvent>;

/// Common interface for completion collaborators.
///
/// Implementations never return an error directly: failures arrive as a
/// `Failed` event on the stream so atomic and streaming modes share the
/// finalize/failure semantics.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Dispatch one request; events arrive on the returned stream
    async fn request(&self, request: &CompletionRequest) -> ResponseStream;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for std::sync::Arc<T> {
    async fn request(&self, request: &CompletionRequest) -> ResponseStream {
        (**self).request(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_events() {
        assert!(ResponseEvent::Terminal.is_closing());
        assert!(ResponseEvent::Atomic {
            text: "x".into(),
            citations: vec![],
        }
        .is_closing());
        assert!(ResponseEvent::Failed {
            error: CompletionError::transport("down"),
        }
        .is_closing());
        assert!(!ResponseEvent::Fragment { delta: "x".into() }.is_closing());
    }

    #[test]
    fn test_server_error_text_carries_status() {
        let err = CompletionError::server(503, "unavailable");
        assert_eq!(
            err.user_facing_text(),
            "Sorry, I encountered an error: 503. Please try again."
        );
    }

    #[test]
    fn test_transport_and_timeout_share_apology() {
        let transport = CompletionError::transport("refused");
        let timeout = CompletionError::timeout(Duration::from_secs(30));
        assert_eq!(transport.user_facing_text(), timeout.user_facing_text());
    }
}
