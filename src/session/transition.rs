//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! new state and effect list, with no I/O.

use super::{Effect, Event, SendState, SessionContext};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SendState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SendState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a request is already awaiting a response")]
    RequestInFlight,
    #[error("cannot submit an empty query")]
    EmptyQuery,
    #[error("response event arrived with no request in flight")]
    UnexpectedResponse,
}

/// Pure transition function
pub fn transition(
    state: SendState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, SessionError> {
    match (state, event) {
        // Idle + Submit -> AwaitingResponse. Side effects in contract
        // order: conversation record on first exchange, persist + append
        // the user message, append the placeholder, dispatch the request.
        (SendState::Idle, Event::Submit { text }) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                return Err(SessionError::EmptyQuery);
            }

            let mut result = TransitionResult::new(SendState::AwaitingResponse);
            if context.is_first_exchange() {
                result = result.with_effect(Effect::CreateConversation {
                    title: text.clone(),
                });
            }
            Ok(result
                .with_effect(Effect::PersistUserMessage { text: text.clone() })
                .with_effect(Effect::AppendUserMessage { text: text.clone() })
                .with_effect(Effect::AppendPlaceholder)
                .with_effect(Effect::RequestCompletion {
                    query: text,
                    use_history: context.history_enabled,
                }))
        }

        // A submission while a request is outstanding is rejected without
        // touching the transcript. No queueing, no pre-emption.
        (SendState::AwaitingResponse, Event::Submit { .. }) => {
            Err(SessionError::RequestInFlight)
        }

        // Response events route through the reducer. Closing events also
        // persist the finalized bot message and return the controller to
        // Idle.
        (SendState::AwaitingResponse, Event::Response(response)) => {
            if response.is_closing() {
                Ok(TransitionResult::new(SendState::Idle)
                    .with_effect(Effect::ApplyResponse { event: response })
                    .with_effect(Effect::PersistBotMessage)
                    .with_effect(Effect::NotifyExchangeComplete))
            } else {
                Ok(TransitionResult::new(SendState::AwaitingResponse)
                    .with_effect(Effect::ApplyResponse { event: response }))
            }
        }

        // A response with nothing outstanding is a protocol violation:
        // logged by the caller, dropped here.
        (SendState::Idle, Event::Response(_)) => Err(SessionError::UnexpectedResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, ResponseEvent};

    fn first_exchange_context() -> SessionContext {
        SessionContext::new(true)
    }

    fn ongoing_context() -> SessionContext {
        SessionContext {
            conversation_id: Some("conv-1".to_string()),
            history_enabled: false,
        }
    }

    #[test]
    fn test_first_submit_creates_conversation_in_order() {
        let result = transition(
            SendState::Idle,
            &first_exchange_context(),
            Event::Submit {
                text: "what is rust".to_string(),
            },
        )
        .unwrap();

        assert_eq!(result.new_state, SendState::AwaitingResponse);
        assert_eq!(
            result.effects,
            vec![
                Effect::CreateConversation {
                    title: "what is rust".to_string(),
                },
                Effect::PersistUserMessage {
                    text: "what is rust".to_string(),
                },
                Effect::AppendUserMessage {
                    text: "what is rust".to_string(),
                },
                Effect::AppendPlaceholder,
                Effect::RequestCompletion {
                    query: "what is rust".to_string(),
                    use_history: true,
                },
            ]
        );
    }

    #[test]
    fn test_later_submit_skips_conversation_creation() {
        let result = transition(
            SendState::Idle,
            &ongoing_context(),
            Event::Submit {
                text: "again".to_string(),
            },
        )
        .unwrap();

        assert!(!result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::CreateConversation { .. })));
    }

    #[test]
    fn test_empty_submit_is_rejected() {
        for text in ["", "   ", "\n\t"] {
            let result = transition(
                SendState::Idle,
                &first_exchange_context(),
                Event::Submit {
                    text: text.to_string(),
                },
            );
            assert!(matches!(result, Err(SessionError::EmptyQuery)));
        }
    }

    #[test]
    fn test_submit_while_awaiting_is_rejected() {
        let result = transition(
            SendState::AwaitingResponse,
            &ongoing_context(),
            Event::Submit {
                text: "impatient".to_string(),
            },
        );
        assert!(matches!(result, Err(SessionError::RequestInFlight)));
    }

    #[test]
    fn test_fragment_keeps_awaiting() {
        let result = transition(
            SendState::AwaitingResponse,
            &ongoing_context(),
            Event::Response(ResponseEvent::Fragment {
                delta: "Hel".to_string(),
            }),
        )
        .unwrap();

        assert_eq!(result.new_state, SendState::AwaitingResponse);
        assert_eq!(result.effects.len(), 1);
    }

    #[test]
    fn test_closing_events_return_to_idle() {
        let closing = [
            ResponseEvent::Terminal,
            ResponseEvent::Atomic {
                text: "X".to_string(),
                citations: vec![],
            },
            ResponseEvent::Failed {
                error: CompletionError::transport("down"),
            },
        ];

        for event in closing {
            let result = transition(
                SendState::AwaitingResponse,
                &ongoing_context(),
                Event::Response(event),
            )
            .unwrap();

            assert_eq!(result.new_state, SendState::Idle);
            assert!(result
                .effects
                .iter()
                .any(|e| matches!(e, Effect::PersistBotMessage)));
            assert!(result
                .effects
                .iter()
                .any(|e| matches!(e, Effect::NotifyExchangeComplete)));
        }
    }

    #[test]
    fn test_response_while_idle_is_rejected() {
        let result = transition(
            SendState::Idle,
            &ongoing_context(),
            Event::Response(ResponseEvent::Terminal),
        );
        assert!(matches!(result, Err(SessionError::UnexpectedResponse)));
    }
}
