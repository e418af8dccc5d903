use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::traits::MessageStore;
use crate::models::{Message, Session};

#[derive(Debug, Default)]
struct Inner {
    sessions: Vec<Session>,
    messages: Vec<Message>,
}

/// Process-local store. Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.sessions.iter().any(|s| s.id == session.id) {
            anyhow::bail!("Session {} already exists", session.id);
        }
        inner.sessions.push(session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<Session>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .iter()
            .find(|s| s.id == session_id && s.user_id == user_id)
            .cloned())
    }

    async fn session_owner(&self, session_id: &str) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| s.user_id.clone()))
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.messages.push(message.clone());
        Ok(())
    }

    async fn list_session_messages(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.session_id == session_id && m.user_id == user_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn list_recent_user_messages(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        // Walk backwards so equal timestamps come out latest-inserted first.
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn refresh_session_stats(
        &self,
        session_id: &str,
        user_id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let count = inner
            .messages
            .iter()
            .filter(|m| m.session_id == session_id && m.user_id == user_id)
            .count() as i64;
        if let Some(session) = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.user_id == user_id)
        {
            session.message_count = count;
            session.updated_at = updated_at;
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .messages
            .retain(|m| !(m.session_id == session_id && m.user_id == user_id));
        inner
            .sessions
            .retain(|s| !(s.id == session_id && s.user_id == user_id));
        Ok(())
    }
}
