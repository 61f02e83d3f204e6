//! Engine configuration

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://localhost:8000/plain-rag-query";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the chat engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Atomic completion endpoint
    pub endpoint: String,
    /// Streaming completion endpoint; when set, the token-streaming
    /// collaborator is used instead of the atomic one
    pub stream_endpoint: Option<String>,
    /// API key for the streaming collaborator; falls back to the stored
    /// preference, then to the guest key
    pub api_key: Option<String>,
    /// Deadline for the collaborator to produce the next response event
    pub request_timeout: Duration,
    /// Location of the local database
    pub db_path: PathBuf,
    /// Stored conversation to resume instead of starting fresh
    pub resume: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let endpoint =
            std::env::var("GODAI_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        let stream_endpoint = std::env::var("GODAI_STREAM_ENDPOINT").ok();

        let api_key = std::env::var("GODAI_API_KEY").ok();

        let request_timeout = std::env::var("GODAI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(
                Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                Duration::from_secs,
            );

        let db_path = std::env::var("GODAI_DB_PATH").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".godai").join("chat.db")
            },
            PathBuf::from,
        );

        Self {
            endpoint,
            stream_endpoint,
            api_key,
            request_timeout,
            db_path,
            resume: std::env::var("GODAI_RESUME").ok(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            stream_endpoint: None,
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            db_path: PathBuf::from("chat.db"),
            resume: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_local_endpoint() {
        let config = EngineConfig::default();
        assert_eq!(config.endpoint, "http://localhost:8000/plain-rag-query");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.stream_endpoint.is_none());
    }
}
