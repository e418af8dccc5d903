use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Message, Session};

/// Persistence for sessions and messages.
///
/// Every read is scoped to one user; implementations must never return rows
/// owned by someone else.
#[async_trait]
pub trait MessageStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn insert_session(&self, session: &Session) -> Result<()>;

    async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<Session>>;

    /// Owner of a session regardless of who is asking, used to enforce ownership on append.
    async fn session_owner(&self, session_id: &str) -> Result<Option<String>>;

    /// Most recently updated first.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>>;

    async fn insert_message(&self, message: &Message) -> Result<()>;

    /// Oldest first.
    async fn list_session_messages(&self, session_id: &str, user_id: &str)
        -> Result<Vec<Message>>;

    /// Newest first, at most `limit` rows.
    async fn list_recent_user_messages(&self, user_id: &str, limit: usize)
        -> Result<Vec<Message>>;

    /// Recount the session's messages and stamp `updated_at`.
    async fn refresh_session_stats(
        &self,
        session_id: &str,
        user_id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Remove the session and all of its messages. Missing sessions are a no-op.
    async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<()>;
}
