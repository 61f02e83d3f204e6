//! Local persistence for conversations, messages and preferences

mod schema;

pub use schema::{Conversation, StoredMessage, SCHEMA};

use crate::transcript::{Citation, Role};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use schema::{parse_role, role_to_str};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Conversation Operations ====================

    /// Create a new conversation, titled with the opening query
    pub fn create_conversation(&self, title: &str) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![id, title, now.to_rfc3339()],
        )?;

        Ok(Conversation {
            id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get conversation by ID
    pub fn get_conversation(&self, id: &str) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
        )?;

        stmt.query_row(params![id], |row| {
            Ok(Conversation {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
                updated_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::ConversationNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// List conversations, most recently updated first
    pub fn list_conversations(&self) -> DbResult<Vec<Conversation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM conversations
             ORDER BY updated_at DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(Conversation {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
                updated_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Delete a conversation and all its messages
    pub fn delete_conversation(&self, id: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id])?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;

        if deleted == 0 {
            return Err(DbError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Append a message to a conversation
    pub fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        citations: &[Citation],
    ) -> DbResult<StoredMessage> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        // Next sequence ID for this conversation
        let sequence_id: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;

        let citations_str = if citations.is_empty() {
            None
        } else {
            Some(serde_json::to_string(citations).unwrap())
        };

        conn.execute(
            "INSERT INTO messages (id, conversation_id, sequence_id, role, content, citations, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                conversation_id,
                sequence_id,
                role_to_str(role),
                content,
                citations_str,
                now.to_rfc3339(),
            ],
        )?;

        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), conversation_id],
        )?;

        Ok(StoredMessage {
            id,
            conversation_id: conversation_id.to_string(),
            sequence_id,
            role,
            content: content.to_string(),
            citations: citations.to_vec(),
            created_at: now,
        })
    }

    /// Get messages for a conversation in chronological order
    pub fn get_messages(&self, conversation_id: &str) -> DbResult<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, sequence_id, role, content, citations, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(StoredMessage {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sequence_id: row.get(2)?,
                role: parse_role(&row.get::<_, String>(3)?),
                content: row.get(4)?,
                citations: row
                    .get::<_, Option<String>>(5)?
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default(),
                created_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Preference Operations ====================

    /// Get a stored preference value
    pub fn get_preference(&self, key: &str) -> DbResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Set a preference value, replacing any previous one
    pub fn set_preference(&self, key: &str, value: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get_conversation() {
        let db = Database::open_in_memory().unwrap();

        let conv = db.create_conversation("what is rust").unwrap();
        assert_eq!(conv.title, "what is rust");

        let fetched = db.get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.id, conv.id);
        assert_eq!(fetched.title, "what is rust");
    }

    #[test]
    fn test_missing_conversation() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_conversation("nope"),
            Err(DbError::ConversationNotFound(_))
        ));
    }

    #[test]
    fn test_add_and_get_messages() {
        let db = Database::open_in_memory().unwrap();
        let conv = db.create_conversation("hello").unwrap();

        let msg1 = db
            .add_message(&conv.id, Role::User, "hello", &[])
            .unwrap();
        let msg2 = db
            .add_message(
                &conv.id,
                Role::Bot,
                "hi there",
                &[Citation::new("handbook")],
            )
            .unwrap();

        assert_eq!(msg1.sequence_id, 1);
        assert_eq!(msg2.sequence_id, 2);

        let messages = db.get_messages(&conv.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].citations, vec![Citation::new("handbook")]);
    }

    #[test]
    fn test_list_orders_by_recency() {
        let db = Database::open_in_memory().unwrap();
        let older = db.create_conversation("older").unwrap();
        let newer = db.create_conversation("newer").unwrap();

        // Touching the older conversation bumps it to the front.
        db.add_message(&older.id, Role::User, "bump", &[]).unwrap();

        let listed = db.list_conversations().unwrap();
        assert_eq!(listed[0].id, older.id);
        assert!(listed.iter().any(|c| c.id == newer.id));
    }

    #[test]
    fn test_delete_conversation_removes_messages() {
        let db = Database::open_in_memory().unwrap();
        let conv = db.create_conversation("gone soon").unwrap();
        db.add_message(&conv.id, Role::User, "hi", &[]).unwrap();

        db.delete_conversation(&conv.id).unwrap();

        assert!(matches!(
            db.get_conversation(&conv.id),
            Err(DbError::ConversationNotFound(_))
        ));
        assert!(db.get_messages(&conv.id).unwrap().is_empty());
    }

    #[test]
    fn test_preference_roundtrip() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.get_preference("history_enabled").unwrap(), None);

        db.set_preference("history_enabled", "true").unwrap();
        assert_eq!(
            db.get_preference("history_enabled").unwrap().as_deref(),
            Some("true")
        );

        db.set_preference("history_enabled", "false").unwrap();
        assert_eq!(
            db.get_preference("history_enabled").unwrap().as_deref(),
            Some("false")
        );
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        {
            let db = Database::open(&path).unwrap();
            let conv = db.create_conversation("persisted").unwrap();
            db.add_message(&conv.id, Role::User, "still here", &[])
                .unwrap();
        }

        let reopened = Database::open(&path).unwrap();
        let listed = reopened.list_conversations().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "persisted");
    }
}
