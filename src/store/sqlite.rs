use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use super::traits::MessageStore;
use crate::models::{Message, MessageMetadata, Role, Session};

const SESSION_COLUMNS: &str = "id, user_id, title, message_count, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "id, user_id, session_id, role, content, metadata, embedding, created_at";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE chat_sessions (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    message_count INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE chat_messages (
                    id TEXT PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    metadata TEXT,
                    embedding BLOB,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
                );

                CREATE INDEX idx_sessions_user_updated ON chat_sessions(user_id, updated_at DESC);
                CREATE INDEX idx_messages_session ON chat_messages(session_id, user_id, created_at);
                CREATE INDEX idx_messages_user_created ON chat_messages(user_id, created_at DESC);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        Ok(())
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| anyhow!("Database connection lock poisoned"))?;
            f(&mut *conn)
        })
        .await?
    }

    // --- Row helpers ---

    fn row_to_session(row: &rusqlite::Row) -> Result<Session> {
        let created_str: String = row.get(4)?;
        let updated_str: String = row.get(5)?;

        Ok(Session {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            message_count: row.get(3)?,
            created_at: parse_timestamp(&created_str)?,
            updated_at: parse_timestamp(&updated_str)?,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<Message> {
        let role_str: String = row.get(3)?;
        let metadata_json: Option<String> = row.get(5)?;
        let embedding_blob: Option<Vec<u8>> = row.get(6)?;
        let created_str: String = row.get(7)?;

        let metadata = match metadata_json {
            Some(json) => serde_json::from_str(&json).context("Malformed message metadata")?,
            None => MessageMetadata::default(),
        };

        Ok(Message {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow!("Unknown role: {}", role_str))?,
            content: row.get(4)?,
            metadata,
            embedding: embedding_blob.map(|b| decode_embedding(&b)).transpose()?,
            created_at: parse_timestamp(&created_str)?,
        })
    }
}

/// Fixed-width so lexical order in SQL matches chronological order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("Embedding blob length {} is not a multiple of 4", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[async_trait]
impl MessageStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        let session = session.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO chat_sessions (id, user_id, title, message_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session.id,
                    session.user_id,
                    session.title,
                    session.message_count,
                    format_timestamp(&session.created_at),
                    format_timestamp(&session.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chat_sessions WHERE id = ?1 AND user_id = ?2",
                SESSION_COLUMNS
            ))?;
            let result = stmt
                .query_row(params![session_id, user_id], |row| {
                    Ok(Self::row_to_session(row))
                })
                .optional()?;
            result.transpose()
        })
        .await
    }

    async fn session_owner(&self, session_id: &str) -> Result<Option<String>> {
        let session_id = session_id.to_string();
        self.run(move |conn| {
            let owner: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM chat_sessions WHERE id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(owner)
        })
        .await
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chat_sessions WHERE user_id = ?1 ORDER BY updated_at DESC",
                SESSION_COLUMNS
            ))?;
            let sessions = stmt
                .query_map(params![user_id], |row| Ok(Self::row_to_session(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        let msg = message.clone();
        self.run(move |conn| {
            let metadata = if msg.metadata.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&msg.metadata)?)
            };
            let embedding = msg.embedding().map(encode_embedding);
            conn.execute(
                "INSERT INTO chat_messages (id, user_id, session_id, role, content, metadata, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    msg.id,
                    msg.user_id,
                    msg.session_id,
                    msg.role.as_str(),
                    msg.content,
                    metadata,
                    embedding,
                    format_timestamp(&msg.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_session_messages(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<Message>> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chat_messages WHERE session_id = ?1 AND user_id = ?2
                 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            ))?;
            let messages = stmt
                .query_map(params![session_id, user_id], |row| {
                    Ok(Self::row_to_message(row))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    async fn list_recent_user_messages(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let user_id = user_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chat_messages WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                MESSAGE_COLUMNS
            ))?;
            let messages = stmt
                .query_map(params![user_id, limit], |row| Ok(Self::row_to_message(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    async fn refresh_session_stats(
        &self,
        session_id: &str,
        user_id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.run(move |conn| {
            conn.execute(
                "UPDATE chat_sessions SET
                    message_count = (SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1 AND user_id = ?2),
                    updated_at = ?3
                 WHERE id = ?1 AND user_id = ?2",
                params![session_id, user_id, format_timestamp(&updated_at)],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chat_messages WHERE session_id = ?1 AND user_id = ?2",
                params![session_id, user_id],
            )?;
            tx.execute(
                "DELETE FROM chat_sessions WHERE id = ?1 AND user_id = ?2",
                params![session_id, user_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
