//! Session runtime
//!
//! Owns the transcript and the send controller state, executes the
//! effects transitions emit, and forwards collaborator response events
//! back onto the single serialized event loop. All transcript mutation
//! happens on that loop; no locking is needed around the transcript
//! itself.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{SessionRuntime, GREETING};
pub use traits::{DatabaseStore, MessageStore};

use crate::transcript::Message;

/// Updates broadcast to UI subscribers after every transcript change
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// A frozen message was appended (user input, greeting, hydrated row)
    MessageAppended { message: Message },

    /// The in-flight message grew; `delta` is exactly the appended text
    DeltaApplied { delta: String },

    /// Typing indicator toggle
    Typing { active: bool },

    /// The exchange finalized; `message` is the completed bot message
    ExchangeComplete { message: Message },

    /// Non-fatal storage trouble surfaced for display
    Error { message: String },
}
