//! GodAI chat - terminal chat client
//!
//! A Rust engine implementing the transcript, stream reducer and send
//! controller behind a chat UI, with a minimal stdin loop standing in
//! for the screens.

mod completion;
mod config;
mod db;
mod prefs;
mod reducer;
mod runtime;
mod session;
mod transcript;

use completion::{
    model_for_version, CompletionService, HttpCompletionService, SseCompletionService,
};
use config::EngineConfig;
use db::Database;
use prefs::{PreferenceStore, SqlitePreferences, API_KEY, MODEL_VERSION};
use runtime::{DatabaseStore, SessionRuntime, SessionUpdate};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "godai_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = EngineConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let prefs = SqlitePreferences::new(db.clone());
    let store = DatabaseStore::new(db.clone());

    let completion: Arc<dyn CompletionService> = match &config.stream_endpoint {
        Some(endpoint) => {
            let api_key = config.api_key.clone().or_else(|| prefs.get(API_KEY));
            let model = model_for_version(prefs.get(MODEL_VERSION).as_deref());
            tracing::info!(endpoint = %endpoint, model, "Using streaming collaborator");
            Arc::new(SseCompletionService::new(
                endpoint,
                api_key,
                model,
                config.request_timeout,
            ))
        }
        None => {
            tracing::info!(endpoint = %config.endpoint, "Using atomic collaborator");
            Arc::new(HttpCompletionService::new(
                &config.endpoint,
                config.request_timeout,
            ))
        }
    };

    let mut session = SessionRuntime::new(
        store,
        completion,
        prefs.clone(),
        config.request_timeout,
    );

    match &config.resume {
        Some(conversation_id) => {
            let conversation = db.get_conversation(conversation_id)?;
            session
                .attach_conversation(&conversation.id)
                .await
                .map_err(std::io::Error::other)?;
            tracing::info!(title = %conversation.title, "Resumed conversation");
        }
        None => session.seed_greeting(),
    }

    // Render updates as they arrive: stream deltas inline, then make sure
    // the finalized content (e.g. the failure text) is what ends up shown.
    let mut updates = session.subscribe();
    tokio::spawn(async move {
        let mut streamed = String::new();
        loop {
            match updates.recv().await {
                Ok(SessionUpdate::DeltaApplied { delta }) => {
                    streamed.push_str(&delta);
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }
                Ok(SessionUpdate::ExchangeComplete { message }) => {
                    if message.content == streamed {
                        println!();
                    } else {
                        if !streamed.is_empty() {
                            println!();
                        }
                        println!("{}", message.content);
                    }
                    for citation in &message.citations {
                        println!("  [source: {}]", citation.title);
                    }
                    streamed.clear();
                }
                Ok(SessionUpdate::Error { message }) => {
                    eprintln!("error: {message}");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Some(greeting) = session.transcript().last() {
        println!("{}", greeting.content);
    }

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();

        match text {
            "" => continue,
            "/quit" => break,
            "/conversations" => {
                for conv in db.list_conversations()? {
                    println!("{}  {}  {}", conv.id, conv.updated_at.to_rfc3339(), conv.title);
                }
                continue;
            }
            _ => {}
        }

        if let Some(rest) = text.strip_prefix("/history ") {
            session.set_history_enabled(rest.trim() == "on");
            println!(
                "history {}",
                if session.history_enabled() { "on" } else { "off" }
            );
            continue;
        }

        if let Some(id) = text.strip_prefix("/delete ") {
            match db.delete_conversation(id.trim()) {
                Ok(()) => println!("deleted"),
                Err(e) => println!("{e}"),
            }
            continue;
        }

        if let Some(version) = text.strip_prefix("/model ") {
            // Takes effect on the next run; the collaborator is built once.
            prefs.set(MODEL_VERSION, version.trim());
            println!("model version saved");
            continue;
        }

        if let Err(e) = session.submit(text).await {
            tracing::warn!(error = %e, "submission rejected");
            continue;
        }
        session.run_until_idle().await;
    }

    Ok(())
}
