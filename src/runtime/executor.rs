//! Session runtime executor

use super::traits::MessageStore;
use super::SessionUpdate;
use crate::completion::{CompletionError, CompletionRequest, CompletionService, ResponseEvent};
use crate::prefs::{PreferenceStore, HISTORY_ENABLED};
use crate::reducer::{reduce, ReducerError};
use crate::session::{transition, Effect, Event, SendState, SessionContext, SessionError};
use crate::transcript::{Message, Role, Transcript};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Greeting seeded into an empty transcript
pub const GREETING: &str = "I am GOD AI. How may I assist you today?";

/// Generic session runtime that can work with any storage, completion and
/// preference implementations
pub struct SessionRuntime<S, C, P>
where
    S: MessageStore + 'static,
    C: CompletionService + 'static,
    P: PreferenceStore + 'static,
{
    context: SessionContext,
    state: SendState,
    transcript: Transcript,
    store: S,
    completion: Arc<C>,
    prefs: P,
    request_timeout: Duration,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    update_tx: broadcast::Sender<SessionUpdate>,
}

impl<S, C, P> SessionRuntime<S, C, P>
where
    S: MessageStore + 'static,
    C: CompletionService + 'static,
    P: PreferenceStore + 'static,
{
    pub fn new(store: S, completion: C, prefs: P, request_timeout: Duration) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (update_tx, _) = broadcast::channel(256);

        // The history flag is read once at construction and written back
        // only through set_history_enabled.
        let history_enabled = prefs.get_bool(HISTORY_ENABLED);

        Self {
            context: SessionContext::new(history_enabled),
            state: SendState::default(),
            transcript: Transcript::new(),
            store,
            completion: Arc::new(completion),
            prefs,
            request_timeout,
            event_rx,
            event_tx,
            update_tx,
        }
    }

    /// Subscribe to transcript updates
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.update_tx.subscribe()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[allow(dead_code)] // State query utility
    pub fn state(&self) -> SendState {
        self.state
    }

    #[allow(dead_code)] // State query utility
    pub fn conversation_id(&self) -> Option<&str> {
        self.context.conversation_id.as_deref()
    }

    pub fn history_enabled(&self) -> bool {
        self.context.history_enabled
    }

    /// Toggle history inclusion and persist the choice
    pub fn set_history_enabled(&mut self, enabled: bool) {
        self.context.history_enabled = enabled;
        self.prefs.set_bool(HISTORY_ENABLED, enabled);
    }

    /// Seed the greeting into a fresh transcript. No-op once any message
    /// exists.
    pub fn seed_greeting(&mut self) {
        if !self.transcript.is_empty() {
            return;
        }
        let message = Message::bot(GREETING);
        if self.transcript.append(message.clone()).is_ok() {
            let _ = self
                .update_tx
                .send(SessionUpdate::MessageAppended { message });
        }
    }

    /// Hydrate the transcript from a stored conversation and continue it
    pub async fn attach_conversation(&mut self, conversation_id: &str) -> Result<(), String> {
        let messages = self.store.get_messages(conversation_id).await?;
        for message in messages {
            self.transcript
                .append(message.clone())
                .map_err(|e| e.to_string())?;
            let _ = self
                .update_tx
                .send(SessionUpdate::MessageAppended { message });
        }
        self.context.conversation_id = Some(conversation_id.to_string());
        Ok(())
    }

    /// Submit a query. Rejected while a response is outstanding.
    pub async fn submit(&mut self, text: &str) -> Result<(), SessionError> {
        self.process(Event::Submit {
            text: text.to_string(),
        })
        .await
    }

    /// Drive the session until the outstanding exchange finalizes
    pub async fn run_until_idle(&mut self) {
        while self.state.is_awaiting() {
            let Some(event) = self.event_rx.recv().await else {
                break;
            };
            if let Err(e) = self.process(event).await {
                // Protocol violations are logged and dropped, never fatal.
                tracing::warn!(error = %e, "dropped session event");
            }
        }
    }

    async fn process(&mut self, event: Event) -> Result<(), SessionError> {
        let result = transition(self.state, &self.context, event)?;
        self.state = result.new_state;
        for effect in result.effects {
            self.execute_effect(effect).await;
        }
        Ok(())
    }

    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CreateConversation { title } => {
                // Storage trouble must not block the exchange; the session
                // keeps running unpersisted.
                match self.store.create_conversation(&title).await {
                    Ok(id) => self.context.conversation_id = Some(id),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to create conversation");
                        let _ = self.update_tx.send(SessionUpdate::Error { message: e });
                    }
                }
            }

            Effect::PersistUserMessage { text } => {
                let Some(conversation_id) = self.context.conversation_id.clone() else {
                    return;
                };
                if let Err(e) = self
                    .store
                    .add_message(&conversation_id, Role::User, &text, &[])
                    .await
                {
                    tracing::error!(error = %e, "failed to persist user message");
                }
            }

            Effect::AppendUserMessage { text } => {
                let message = Message::user(text);
                match self.transcript.append(message.clone()) {
                    Ok(()) => {
                        let _ = self
                            .update_tx
                            .send(SessionUpdate::MessageAppended { message });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to append user message"),
                }
            }

            Effect::AppendPlaceholder => match self.transcript.append_placeholder() {
                Ok(()) => {
                    let _ = self.update_tx.send(SessionUpdate::Typing { active: true });
                }
                Err(e) => tracing::error!(error = %e, "failed to append placeholder"),
            },

            Effect::RequestCompletion { query, use_history } => {
                self.spawn_completion(CompletionRequest::new(query, use_history));
            }

            Effect::ApplyResponse { event } => {
                let grown = match &event {
                    ResponseEvent::Fragment { delta } => Some(delta.clone()),
                    ResponseEvent::Atomic { text, .. } => Some(text.clone()),
                    ResponseEvent::Terminal | ResponseEvent::Failed { .. } => None,
                };
                match reduce(&mut self.transcript, &event) {
                    Ok(_) => {
                        if let Some(delta) = grown {
                            let _ = self.update_tx.send(SessionUpdate::DeltaApplied { delta });
                        }
                    }
                    Err(ReducerError::StreamAlreadyFinalized) => {
                        tracing::warn!("dropped response event after finalize");
                    }
                }
            }

            Effect::PersistBotMessage => {
                let Some(conversation_id) = self.context.conversation_id.clone() else {
                    return;
                };
                let Some(message) = self.transcript.last().cloned() else {
                    return;
                };
                if let Err(e) = self
                    .store
                    .add_message(
                        &conversation_id,
                        Role::Bot,
                        &message.content,
                        &message.citations,
                    )
                    .await
                {
                    tracing::error!(error = %e, "failed to persist bot message");
                }
            }

            Effect::NotifyExchangeComplete => {
                let _ = self.update_tx.send(SessionUpdate::Typing { active: false });
                if let Some(message) = self.transcript.last().cloned() {
                    let _ = self
                        .update_tx
                        .send(SessionUpdate::ExchangeComplete { message });
                }
            }
        }
    }

    /// Run the collaborator call off the event loop, forwarding its events
    /// back in. The deadline applies between events, so a healthy stream
    /// can run as long as it keeps producing.
    fn spawn_completion(&self, request: CompletionRequest) {
        let completion = Arc::clone(&self.completion);
        let event_tx = self.event_tx.clone();
        let deadline = self.request_timeout;

        tokio::spawn(async move {
            let mut stream = completion.request(&request).await;
            loop {
                let event = match tokio::time::timeout(deadline, stream.recv()).await {
                    Ok(Some(event)) => event,
                    Ok(None) => ResponseEvent::Failed {
                        error: CompletionError::transport("response stream ended unexpectedly"),
                    },
                    Err(_) => ResponseEvent::Failed {
                        error: CompletionError::timeout(deadline),
                    },
                };

                let closing = event.is_closing();
                if event_tx.send(Event::Response(event)).await.is_err() || closing {
                    break;
                }
            }
        });
    }
}
