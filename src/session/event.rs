//! Events that drive the send controller

use crate::completion::ResponseEvent;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// User submitted a query
    Submit { text: String },

    /// The completion collaborator delivered a response event
    Response(ResponseEvent),
}
