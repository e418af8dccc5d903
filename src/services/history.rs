use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use uuid::Uuid;

use super::context::truncate_title;
use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingProvider;
use crate::models::{Message, NewMessage, Session};
use crate::retrieval::{ContextRetriever, ContextSelection};
use crate::store::MessageStore;

/// Session and message bookkeeping on top of a [`MessageStore`].
pub struct ChatHistoryService {
    store: Arc<dyn MessageStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    retriever: ContextRetriever,
}

impl ChatHistoryService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        retrieval: RetrievalConfig,
    ) -> Self {
        let retriever = ContextRetriever::new(store.clone(), embedder.clone(), retrieval);
        Self {
            store,
            embedder,
            retriever,
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub async fn create_session(&self, user_id: &str, title: Option<&str>) -> Result<Session> {
        ensure_user(user_id)?;
        let now = Utc::now();
        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => format!("Chat {}", now.format("%Y-%m-%d")),
        };
        let session = Session::new(Uuid::new_v4().to_string(), user_id, title, now);
        self.store
            .insert_session(&session)
            .await
            .context("Failed to save session")?;
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Option<Session>> {
        self.store.get_session(session_id, user_id).await
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        self.store.list_sessions(user_id).await
    }

    pub async fn session_messages(&self, session_id: &str, user_id: &str) -> Result<Vec<Message>> {
        self.store.list_session_messages(session_id, user_id).await
    }

    pub async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.store
            .delete_session(session_id, user_id)
            .await
            .context("Failed to delete session")
    }

    /// Append a message, creating its session on first use.
    ///
    /// The session must not belong to another user. Embedding failures are
    /// logged and the message is stored without a vector.
    pub async fn store_message(&self, new: NewMessage) -> Result<Message> {
        ensure_user(&new.user_id)?;
        if new.session_id.trim().is_empty() {
            bail!("Session id is required");
        }

        let created = self.ensure_session(&new).await?;

        let embedding = self.embed(&new.content).await;
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            session_id: new.session_id,
            role: new.role,
            content: new.content,
            metadata: new.metadata,
            embedding,
            created_at: now,
        };

        if let Err(e) = self.store.insert_message(&message).await {
            if created {
                if let Err(cleanup) = self
                    .store
                    .delete_session(&message.session_id, &message.user_id)
                    .await
                {
                    tracing::error!(
                        session_id = %message.session_id,
                        "Failed to remove empty session: {:#}",
                        cleanup
                    );
                }
            }
            return Err(e.context("Failed to save message"));
        }

        if let Err(e) = self
            .store
            .refresh_session_stats(&message.session_id, &message.user_id, now)
            .await
        {
            tracing::error!(
                session_id = %message.session_id,
                "Failed to update session stats: {:#}",
                e
            );
        }

        Ok(message)
    }

    pub async fn relevant_context(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> ContextSelection {
        self.retriever.relevant_context(user_id, query, limit).await
    }

    /// Returns `true` when this call created the session.
    async fn ensure_session(&self, new: &NewMessage) -> Result<bool> {
        match self.store.session_owner(&new.session_id).await? {
            Some(owner) if owner == new.user_id => return Ok(false),
            Some(_) => bail!("Session {} belongs to another user", new.session_id),
            None => {}
        }

        let session = Session::new(
            new.session_id.clone(),
            new.user_id.clone(),
            truncate_title(&new.content),
            Utc::now(),
        );
        if let Err(e) = self.store.insert_session(&session).await {
            // A concurrent turn may have created it first.
            return match self.store.session_owner(&new.session_id).await? {
                Some(owner) if owner == new.user_id => Ok(false),
                Some(_) => bail!("Session {} belongs to another user", new.session_id),
                None => Err(e.context("Failed to create session")),
            };
        }
        tracing::debug!(session_id = %session.id, "Created session for first message");
        Ok(true)
    }

    async fn embed(&self, content: &str) -> Option<Vec<f32>> {
        self.embedder.as_ref()?.embed_or_none(content).await
    }
}

fn ensure_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        bail!("User id is required");
    }
    Ok(())
}
