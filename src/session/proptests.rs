//! Property-based tests for the send controller
//!
//! Drives the pure transition function plus the reducer over arbitrary
//! event sequences and checks the transcript invariants hold throughout.

use super::*;
use crate::completion::{CompletionError, ResponseEvent};
use crate::reducer::reduce;
use crate::transcript::{Message, Transcript};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_response_event() -> impl Strategy<Value = ResponseEvent> {
    prop_oneof![
        "[a-zA-Z ]{0,8}".prop_map(|delta| ResponseEvent::Fragment { delta }),
        Just(ResponseEvent::Terminal),
        "[a-zA-Z ]{1,12}".prop_map(|text| ResponseEvent::Atomic {
            text,
            citations: vec![],
        }),
        Just(ResponseEvent::Failed {
            error: CompletionError::transport("down"),
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-z ]{0,10}".prop_map(|text| Event::Submit { text }),
        arb_response_event().prop_map(Event::Response),
    ]
}

// ============================================================================
// Harness
// ============================================================================

/// Minimal interpreter: applies transcript-touching effects and drops the
/// I/O ones, the way the runtime would with collaborators stubbed out.
struct Harness {
    state: SendState,
    context: SessionContext,
    transcript: Transcript,
}

impl Harness {
    fn new() -> Self {
        Self {
            state: SendState::Idle,
            context: SessionContext::new(false),
            transcript: Transcript::new(),
        }
    }

    fn apply(&mut self, event: Event) -> Result<(), SessionError> {
        let result = transition(self.state, &self.context, event)?;
        self.state = result.new_state;
        for effect in result.effects {
            match effect {
                Effect::CreateConversation { .. } => {
                    self.context.conversation_id = Some("conv".to_string());
                }
                Effect::AppendUserMessage { text } => {
                    self.transcript
                        .append(Message::user(text))
                        .expect("user append must succeed from Idle");
                }
                Effect::AppendPlaceholder => {
                    self.transcript
                        .append_placeholder()
                        .expect("placeholder append must succeed after user append");
                }
                Effect::ApplyResponse { event } => {
                    reduce(&mut self.transcript, &event)
                        .expect("reducer cannot see a finalized stream while awaiting");
                }
                Effect::PersistUserMessage { .. }
                | Effect::RequestCompletion { .. }
                | Effect::PersistBotMessage
                | Effect::NotifyExchangeComplete => {}
            }
        }
        Ok(())
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// The controller state and the transcript's in-flight slot always
    /// agree, for any event sequence.
    #[test]
    fn prop_state_and_in_flight_agree(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut harness = Harness::new();
        for event in events {
            let _ = harness.apply(event);
            prop_assert_eq!(
                harness.state.is_awaiting(),
                harness.transcript.is_in_flight()
            );
        }
    }

    /// A rejected event leaves the transcript exactly as it was.
    #[test]
    fn prop_rejected_events_leave_transcript_unchanged(
        events in proptest::collection::vec(arb_event(), 0..40)
    ) {
        let mut harness = Harness::new();
        for event in events {
            let before: Vec<String> = harness
                .transcript
                .messages()
                .iter()
                .map(|m| m.content.clone())
                .collect();
            if harness.apply(event).is_err() {
                let after: Vec<String> = harness
                    .transcript
                    .messages()
                    .iter()
                    .map(|m| m.content.clone())
                    .collect();
                prop_assert_eq!(before, after);
            }
        }
    }

    /// Streamed fragments concatenate in order with nothing inserted.
    #[test]
    fn prop_fragment_concatenation_is_exact(
        deltas in proptest::collection::vec("[a-zA-Z ]{0,6}", 0..12)
    ) {
        let mut harness = Harness::new();
        harness
            .apply(Event::Submit { text: "question".to_string() })
            .unwrap();

        for delta in &deltas {
            harness
                .apply(Event::Response(ResponseEvent::Fragment { delta: delta.clone() }))
                .unwrap();
        }
        harness.apply(Event::Response(ResponseEvent::Terminal)).unwrap();

        let expected: String = deltas.concat();
        prop_assert_eq!(&harness.transcript.last().unwrap().content, &expected);
        prop_assert_eq!(harness.state, SendState::Idle);
    }

    /// Submissions while awaiting are always rejected.
    #[test]
    fn prop_submit_while_awaiting_always_rejected(text in "[a-z]{1,10}") {
        let mut harness = Harness::new();
        harness
            .apply(Event::Submit { text: "first".to_string() })
            .unwrap();

        let result = harness.apply(Event::Submit { text });
        prop_assert_eq!(result, Err(SessionError::RequestInFlight));
    }
}
