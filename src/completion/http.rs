//! Atomic HTTP completion collaborator
//!
//! One `POST` per exchange; the whole answer (plus optional context
//! citation) comes back in a single JSON body.

use super::{CompletionError, CompletionRequest, CompletionService, ResponseEvent, ResponseStream};
use crate::transcript::Citation;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Completion service backed by a plain request/response endpoint
pub struct HttpCompletionService {
    client: Client,
    endpoint: String,
}

impl HttpCompletionService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn fetch(client: Client, endpoint: String, request: CompletionRequest) -> ResponseEvent {
        let body = QueryBody {
            query: &request.query,
            use_history: u8::from(request.use_history),
        };

        let response = match client.post(&endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    CompletionError::transport(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    CompletionError::transport(format!("connection failed: {e}"))
                } else {
                    CompletionError::transport(format!("request failed: {e}"))
                };
                return ResponseEvent::Failed { error };
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return ResponseEvent::Failed {
                    error: CompletionError::transport(format!("failed to read response: {e}")),
                };
            }
        };

        if !status.is_success() {
            return ResponseEvent::Failed {
                error: CompletionError::server(status.as_u16(), text),
            };
        }

        match parse_answer(&text) {
            Ok(event) => event,
            Err(error) => ResponseEvent::Failed { error },
        }
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn request(&self, request: &CompletionRequest) -> ResponseStream {
        let (tx, rx) = mpsc::channel(1);
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let request = request.clone();

        tokio::spawn(async move {
            let event = Self::fetch(client, endpoint, request).await;
            let _ = tx.send(event).await;
        });

        rx
    }
}

fn parse_answer(body: &str) -> Result<ResponseEvent, CompletionError> {
    let parsed: QueryResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::protocol(format!("unexpected response body: {e}")))?;

    let citations = parsed
        .context_used
        .into_iter()
        .map(Citation::new)
        .collect();

    Ok(ResponseEvent::Atomic {
        text: parsed.answer,
        citations,
    })
}

// Wire types

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    use_history: u8,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    answer: String,
    #[serde(default)]
    context_used: Option<String>,
}
