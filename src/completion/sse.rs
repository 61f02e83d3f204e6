//! Token-streaming completion collaborator
//!
//! Speaks the chat-completions wire shape: one `data:` frame per event,
//! each carrying a text delta in `choices[0].delta.content`, with either a
//! `finish_reason` or a `[DONE]` sentinel marking end-of-stream. Frames
//! arriving after the finish signal are suppressed here; the reducer
//! defends against them independently.

use super::{CompletionError, CompletionRequest, CompletionService, ResponseEvent, ResponseStream};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// API key used when none is configured
const GUEST_API_KEY: &str = "GUEST_KEY";

/// Map the stored model-version preference to a wire model name
pub fn model_for_version(version: Option<&str>) -> &'static str {
    match version {
        Some("4") => "gpt-4",
        _ => "gpt-3.5-turbo",
    }
}

/// Completion service backed by a server-sent-events token stream
pub struct SseCompletionService {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl SseCompletionService {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        // No whole-request timeout: a healthy stream can legitimately run
        // longer than any fixed cap. The session runtime enforces an
        // inter-event deadline instead.
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.unwrap_or_else(|| GUEST_API_KEY.to_string()),
            model: model.into(),
        }
    }

    async fn stream_into(
        client: Client,
        endpoint: String,
        api_key: String,
        model: String,
        request: CompletionRequest,
        tx: mpsc::Sender<ResponseEvent>,
    ) {
        let body = StreamBody {
            model: &model,
            stream: true,
            messages: vec![WireMessage {
                role: "user",
                content: &request.query,
            }],
        };

        let response = match client
            .post(&endpoint)
            .bearer_auth(&api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let _ = tx
                    .send(ResponseEvent::Failed {
                        error: CompletionError::transport(format!("connection failed: {e}")),
                    })
                    .await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let _ = tx
                .send(ResponseEvent::Failed {
                    error: CompletionError::server(status.as_u16(), text),
                })
                .await;
            return;
        }

        let mut byte_stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = byte_stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx
                        .send(ResponseEvent::Failed {
                            error: CompletionError::transport(format!("stream error: {e}")),
                        })
                        .await;
                    return;
                }
            };

            for event in decoder.feed(&String::from_utf8_lossy(&bytes)) {
                let closing = event.is_closing();
                if tx.send(event).await.is_err() || closing {
                    return;
                }
            }
        }

        // The connection closed without a finish signal. Close the exchange
        // anyway: the placeholder must never be left in flight.
        if !decoder.is_finished() {
            tracing::warn!("stream ended without finish signal");
            let _ = tx.send(ResponseEvent::Terminal).await;
        }
    }
}

#[async_trait]
impl CompletionService for SseCompletionService {
    async fn request(&self, request: &CompletionRequest) -> ResponseStream {
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(Self::stream_into(
            self.client.clone(),
            self.endpoint.clone(),
            self.api_key.clone(),
            self.model.clone(),
            request.clone(),
            tx,
        ));

        rx
    }
}

/// Incremental SSE frame decoder.
///
/// Fed raw chunk text in whatever sizes the transport delivers, emits
/// decoded response events. Tolerates frames split across chunk
/// boundaries and drops anything after the finish signal.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: String,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<ResponseEvent> {
        self.buf.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            self.decode_line(line, &mut events);
        }

        events
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<ResponseEvent>) {
        // Only data lines matter; event names, ids and comments are noise.
        let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
            return;
        };

        if payload == "[DONE]" {
            if !self.finished {
                self.finished = true;
                events.push(ResponseEvent::Terminal);
            }
            return;
        }

        let frame: StreamFrame = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable stream frame");
                return;
            }
        };

        let Some(choice) = frame.choices.into_iter().next() else {
            return;
        };

        if self.finished {
            tracing::warn!("dropping frame received after finish signal");
            return;
        }

        // A frame can carry both a delta and the finish marker; the delta
        // precedes the finish.
        if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
            events.push(ResponseEvent::Fragment { delta });
        }

        if choice.finish_reason.is_some() {
            self.finished = true;
            events.push(ResponseEvent::Terminal);
        }
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct StreamBody<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(delta: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{delta}\"}}}}]}}\n\n")
    }

    #[test]
    fn test_decodes_fragments_in_order() {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(&frame("Hel"));
        events.extend(decoder.feed(&frame("lo")));

        assert_eq!(
            events,
            vec![
                ResponseEvent::Fragment { delta: "Hel".into() },
                ResponseEvent::Fragment { delta: "lo".into() },
            ]
        );
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let whole = frame("hello world");
        let (head, tail) = whole.split_at(10);

        assert!(decoder.feed(head).is_empty());
        assert_eq!(
            decoder.feed(tail),
            vec![ResponseEvent::Fragment {
                delta: "hello world".into()
            }]
        );
    }

    #[test]
    fn test_done_sentinel_terminates() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("data: [DONE]\n\n");
        assert_eq!(events, vec![ResponseEvent::Terminal]);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_finish_reason_terminates() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
        assert_eq!(events, vec![ResponseEvent::Terminal]);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_delta_and_finish_in_same_frame() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(
            "data: {\"choices\":[{\"delta\":{\"content\":\"end\"},\"finish_reason\":\"stop\"}]}\n\n",
        );
        assert_eq!(
            events,
            vec![
                ResponseEvent::Fragment { delta: "end".into() },
                ResponseEvent::Terminal,
            ]
        );
    }

    #[test]
    fn test_fragment_after_finish_is_dropped() {
        let mut decoder = SseDecoder::new();
        decoder.feed("data: [DONE]\n\n");
        assert!(decoder.feed(&frame("late")).is_empty());
    }

    #[test]
    fn test_ignores_non_data_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(": keep-alive\nevent: message\nid: 7\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n\r\n",
        );
        assert_eq!(events, vec![ResponseEvent::Fragment { delta: "hi".into() }]);
    }

    #[test]
    fn test_model_for_version() {
        assert_eq!(model_for_version(Some("4")), "gpt-4");
        assert_eq!(model_for_version(Some("3.5")), "gpt-3.5-turbo");
        assert_eq!(model_for_version(None), "gpt-3.5-turbo");
    }
}
