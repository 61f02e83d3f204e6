//! Effects produced by state transitions

use crate::completion::ResponseEvent;

/// Effects to be executed, in order, after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create the backing conversation record (first exchange only),
    /// titled with the query text
    CreateConversation { title: String },

    /// Persist the user's message to the backing conversation
    PersistUserMessage { text: String },

    /// Append the user's message to the transcript
    AppendUserMessage { text: String },

    /// Append the empty in-flight bot placeholder
    AppendPlaceholder,

    /// Dispatch the completion request
    RequestCompletion { query: String, use_history: bool },

    /// Run the stream reducer over one response event
    ApplyResponse { event: ResponseEvent },

    /// Persist the finalized bot message to the backing conversation
    PersistBotMessage,

    /// Tell subscribers the exchange is over
    NotifyExchangeComplete,
}
