use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::scoring::{cosine_similarity, keyword_recency_score};
use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingProvider;
use crate::models::Message;
use crate::store::MessageStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Embedding,
    KeywordRecency,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredMessage {
    pub message: Message,
    pub score: f64,
}

/// Messages picked as context for one turn, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSelection {
    pub strategy: Strategy,
    pub messages: Vec<ScoredMessage>,
}

impl ContextSelection {
    fn empty(strategy: Strategy) -> Self {
        Self {
            strategy,
            messages: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages.into_iter().map(|s| s.message).collect()
    }
}

/// Picks the prior messages worth sending along with a new one.
///
/// Embedding similarity is preferred whenever the query can be embedded and
/// stored embeddings exist; anything else degrades to keyword and recency
/// scoring. Retrieval never fails: the worst outcome is an empty selection.
pub struct ContextRetriever {
    store: Arc<dyn MessageStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(
        store: Arc<dyn MessageStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// `limit` defaults to the configured context size.
    pub async fn relevant_context(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> ContextSelection {
        self.relevant_context_at(user_id, query, limit, Utc::now())
            .await
    }

    pub async fn relevant_context_at(
        &self,
        user_id: &str,
        query: &str,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> ContextSelection {
        let limit = limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return ContextSelection::empty(Strategy::KeywordRecency);
        }

        if let Some(query_embedding) = self.query_embedding(query).await {
            match self.embedding_context(user_id, &query_embedding, limit).await {
                Ok(Some(messages)) => {
                    tracing::debug!(
                        user_id,
                        selected = messages.len(),
                        "Embedding context selected"
                    );
                    return ContextSelection {
                        strategy: Strategy::Embedding,
                        messages,
                    };
                }
                Ok(None) => {
                    tracing::debug!(user_id, "No stored embeddings, using keyword scoring");
                }
                Err(e) => {
                    tracing::warn!(
                        user_id,
                        "Embedding search failed, using keyword scoring: {:#}",
                        e
                    );
                }
            }
        }

        match self.keyword_context(user_id, query, limit, now).await {
            Ok(messages) => {
                tracing::debug!(
                    user_id,
                    selected = messages.len(),
                    "Keyword context selected"
                );
                ContextSelection {
                    strategy: Strategy::KeywordRecency,
                    messages,
                }
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    "Keyword search failed, continuing without context: {:#}",
                    e
                );
                ContextSelection::empty(Strategy::KeywordRecency)
            }
        }
    }

    async fn query_embedding(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        if query.trim().is_empty() {
            return None;
        }
        embedder.embed_or_none(query).await
    }

    async fn candidates(&self, user_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut pool = self
            .store
            .list_recent_user_messages(user_id, limit.saturating_mul(2))
            .await?;
        pool.retain(|m| m.user_id == user_id);
        Ok(pool)
    }

    /// `Ok(None)` when no candidate carries an embedding.
    async fn embedding_context(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Option<Vec<ScoredMessage>>> {
        let pool = self.candidates(user_id, limit).await?;

        let mut any_embedded = false;
        let scored: Vec<ScoredMessage> = pool
            .into_iter()
            .filter_map(|message| {
                let score = cosine_similarity(query_embedding, message.embedding()?);
                any_embedded = true;
                Some(ScoredMessage { message, score })
            })
            .filter(|s| self.config.min_similarity.map_or(true, |min| s.score >= min))
            .collect();

        if !any_embedded {
            return Ok(None);
        }
        Ok(Some(select(scored, limit)))
    }

    async fn keyword_context(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredMessage>> {
        let pool = self.candidates(user_id, limit).await?;
        let scored = pool
            .into_iter()
            .map(|message| {
                let score = keyword_recency_score(
                    query,
                    &message.content,
                    message.created_at,
                    now,
                    &self.config,
                );
                ScoredMessage { message, score }
            })
            .collect();
        Ok(select(scored, limit))
    }
}

/// Highest scores win; the survivors are returned in chronological order.
///
/// Candidates arrive newest first and the sort is stable, so equal scores
/// favour the later message.
fn select(mut scored: Vec<ScoredMessage>, limit: usize) -> Vec<ScoredMessage> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored.sort_by(|a, b| a.message.created_at.cmp(&b.message.created_at));
    scored
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::embeddings::EmbeddingError;
    use crate::models::{MessageMetadata, Role, Session};
    use crate::store::InMemoryStore;

    struct ScriptedEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl ScriptedEmbedder {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Arc<Self> {
            Arc::new(Self {
                vectors: pairs
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.clone()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedEmbedder {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| EmbeddingError::NetworkError("connection refused".to_string()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl MessageStore for BrokenStore {
        fn backend_name(&self) -> &'static str {
            "broken"
        }
        async fn insert_session(&self, _: &Session) -> Result<()> {
            anyhow::bail!("unavailable")
        }
        async fn get_session(&self, _: &str, _: &str) -> Result<Option<Session>> {
            anyhow::bail!("unavailable")
        }
        async fn session_owner(&self, _: &str) -> Result<Option<String>> {
            anyhow::bail!("unavailable")
        }
        async fn list_sessions(&self, _: &str) -> Result<Vec<Session>> {
            anyhow::bail!("unavailable")
        }
        async fn insert_message(&self, _: &Message) -> Result<()> {
            anyhow::bail!("unavailable")
        }
        async fn list_session_messages(&self, _: &str, _: &str) -> Result<Vec<Message>> {
            anyhow::bail!("unavailable")
        }
        async fn list_recent_user_messages(&self, _: &str, _: usize) -> Result<Vec<Message>> {
            anyhow::bail!("unavailable")
        }
        async fn refresh_session_stats(&self, _: &str, _: &str, _: DateTime<Utc>) -> Result<()> {
            anyhow::bail!("unavailable")
        }
        async fn delete_session(&self, _: &str, _: &str) -> Result<()> {
            anyhow::bail!("unavailable")
        }
    }

    fn message(
        id: &str,
        user: &str,
        content: &str,
        at: DateTime<Utc>,
        embedding: Option<Vec<f32>>,
    ) -> Message {
        Message {
            id: id.to_string(),
            user_id: user.to_string(),
            session_id: format!("{}-session", user),
            role: Role::User,
            content: content.to_string(),
            metadata: MessageMetadata::default(),
            embedding,
            created_at: at,
        }
    }

    async fn pizza_store(now: DateTime<Utc>, with_embeddings: bool) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let emb = |v: [f32; 3]| with_embeddings.then(|| v.to_vec());
        let t0 = now - Duration::minutes(3);
        let t1 = t0 + Duration::minutes(1);
        let t2 = t0 + Duration::minutes(2);
        for msg in [
            message("m1", "u", "I like pizza", t0, emb([1.0, 0.0, 0.0])),
            message("m2", "u", "pizza is great", t1, emb([0.9, 0.1, 0.0])),
            message("m3", "u", "what is your name", t2, emb([0.1, 0.0, 1.0])),
        ] {
            store.insert_message(&msg).await.unwrap();
        }
        store
    }

    fn ids(selection: &ContextSelection) -> Vec<&str> {
        selection
            .messages
            .iter()
            .map(|s| s.message.id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_keyword_example_selects_matching_messages() {
        let now = Utc::now();
        let store = pizza_store(now, false).await;
        let retriever = ContextRetriever::new(store, None, RetrievalConfig::default());

        let selection = retriever
            .relevant_context_at("u", "pizza", Some(2), now)
            .await;

        assert_eq!(selection.strategy, Strategy::KeywordRecency);
        assert_eq!(ids(&selection), vec!["m1", "m2"]);
        // m2 is newer, so it outranks m1 on recency.
        assert!(selection.messages[1].score > selection.messages[0].score);
    }

    #[tokio::test]
    async fn test_embedding_example_prefers_semantic_match() {
        let now = Utc::now();
        let store = pizza_store(now, true).await;
        let embedder = ScriptedEmbedder::new(&[("pizza", vec![0.0, 0.0, 1.0])]);
        let retriever = ContextRetriever::new(store, Some(embedder), RetrievalConfig::default());

        let selection = retriever
            .relevant_context_at("u", "pizza", Some(2), now)
            .await;

        assert_eq!(selection.strategy, Strategy::Embedding);
        assert_eq!(selection.len(), 2);
        assert!(ids(&selection).contains(&"m3"));
        assert_eq!(ids(&selection), vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn test_embedder_failure_falls_back_to_keywords() {
        let now = Utc::now();
        let store = pizza_store(now, true).await;
        let embedder = ScriptedEmbedder::new(&[]);
        let retriever = ContextRetriever::new(store, Some(embedder), RetrievalConfig::default());

        let selection = retriever
            .relevant_context_at("u", "pizza", Some(2), now)
            .await;

        assert_eq!(selection.strategy, Strategy::KeywordRecency);
        assert_eq!(ids(&selection), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_missing_stored_embeddings_fall_back_to_keywords() {
        let now = Utc::now();
        let store = pizza_store(now, false).await;
        let embedder = ScriptedEmbedder::new(&[("pizza", vec![0.0, 0.0, 1.0])]);
        let retriever = ContextRetriever::new(store, Some(embedder), RetrievalConfig::default());

        let selection = retriever
            .relevant_context_at("u", "pizza", Some(2), now)
            .await;
        assert_eq!(selection.strategy, Strategy::KeywordRecency);
    }

    #[tokio::test]
    async fn test_unembedded_candidates_are_excluded() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        let earlier = now - Duration::minutes(2);
        store
            .insert_message(&message("a", "u", "hola", earlier, Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        store
            .insert_message(&message("b", "u", "hola", now - Duration::minutes(1), None))
            .await
            .unwrap();
        let embedder = ScriptedEmbedder::new(&[("hola", vec![1.0, 0.0])]);
        let retriever = ContextRetriever::new(store, Some(embedder), RetrievalConfig::default());

        let selection = retriever.relevant_context_at("u", "hola", Some(5), now).await;
        assert_eq!(selection.strategy, Strategy::Embedding);
        assert_eq!(ids(&selection), vec!["a"]);
    }

    #[tokio::test]
    async fn test_min_similarity_threshold() {
        let now = Utc::now();
        let store = pizza_store(now, true).await;
        let embedder = ScriptedEmbedder::new(&[("pizza", vec![0.0, 0.0, 1.0])]);
        let config = RetrievalConfig {
            min_similarity: Some(0.3),
            ..Default::default()
        };
        let retriever = ContextRetriever::new(store, Some(embedder), config);

        let selection = retriever.relevant_context_at("u", "pizza", Some(3), now).await;
        assert_eq!(ids(&selection), vec!["m3"]);
    }

    #[tokio::test]
    async fn test_other_users_never_appear() {
        let now = Utc::now();
        let store = pizza_store(now, true).await;
        let intruder = message(
            "intruder",
            "v",
            "pizza pizza pizza",
            now,
            Some(vec![0.0, 0.0, 1.0]),
        );
        store.insert_message(&intruder).await.unwrap();

        let keyword = ContextRetriever::new(store.clone(), None, RetrievalConfig::default());
        let selection = keyword.relevant_context_at("u", "pizza", Some(10), now).await;
        assert!(selection.messages.iter().all(|s| s.message.user_id == "u"));

        let embedder = ScriptedEmbedder::new(&[("pizza", vec![0.0, 0.0, 1.0])]);
        let semantic = ContextRetriever::new(store, Some(embedder), RetrievalConfig::default());
        let selection = semantic.relevant_context_at("u", "pizza", Some(10), now).await;
        assert_eq!(selection.strategy, Strategy::Embedding);
        assert!(selection.messages.iter().all(|s| s.message.user_id == "u"));

        let selection = semantic.relevant_context_at("nobody", "pizza", None, now).await;
        assert!(selection.is_empty());
    }

    #[tokio::test]
    async fn test_limit_and_chronological_order() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        let words = ["hola", "gracias", "hola amigo", "adios", "hola hola", "buenas", "hola"];
        for (i, w) in words.iter().enumerate() {
            store
                .insert_message(&message(
                    &format!("m{}", i),
                    "u",
                    w,
                    now - Duration::hours(10 * (words.len() - i) as i64),
                    None,
                ))
                .await
                .unwrap();
        }
        let retriever = ContextRetriever::new(store, None, RetrievalConfig::default());

        for limit in 1..=8 {
            let selection = retriever
                .relevant_context_at("u", "hola", Some(limit), now)
                .await;
            assert!(selection.len() <= limit);
            assert!(selection
                .messages
                .windows(2)
                .all(|w| w[0].message.created_at <= w[1].message.created_at));
        }
    }

    #[tokio::test]
    async fn test_candidate_pool_is_twice_the_limit() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        // The only keyword match is the oldest message, outside the newest 2 * limit.
        store
            .insert_message(&message("old", "u", "pizza", now - Duration::hours(5), None))
            .await
            .unwrap();
        for i in 0..4 {
            store
                .insert_message(&message(
                    &format!("n{}", i),
                    "u",
                    "buenos dias",
                    now - Duration::minutes(10 - i),
                    None,
                ))
                .await
                .unwrap();
        }
        let retriever = ContextRetriever::new(store, None, RetrievalConfig::default());

        let selection = retriever.relevant_context_at("u", "pizza", Some(2), now).await;
        assert!(!ids(&selection).contains(&"old"));
        assert_eq!(ids(&selection), vec!["n2", "n3"]);
    }

    #[tokio::test]
    async fn test_equal_overlap_prefers_newer_message() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_message(&message("older", "u", "la playa", now - Duration::days(2), None))
            .await
            .unwrap();
        store
            .insert_message(&message("newer", "u", "la playa", now - Duration::days(1), None))
            .await
            .unwrap();
        let retriever = ContextRetriever::new(store, None, RetrievalConfig::default());

        let selection = retriever.relevant_context_at("u", "playa", Some(1), now).await;
        assert_eq!(ids(&selection), vec!["newer"]);
    }

    #[tokio::test]
    async fn test_empty_query_still_ranks_by_recency() {
        let now = Utc::now();
        let store = pizza_store(now, false).await;
        let retriever = ContextRetriever::new(store, None, RetrievalConfig::default());

        let selection = retriever.relevant_context_at("u", "   ", Some(1), now).await;
        assert_eq!(ids(&selection), vec!["m3"]);
    }

    #[tokio::test]
    async fn test_store_failure_yields_empty_context() {
        let embedder = ScriptedEmbedder::new(&[("pizza", vec![0.0, 0.0, 1.0])]);
        let retriever = ContextRetriever::new(
            Arc::new(BrokenStore),
            Some(embedder),
            RetrievalConfig::default(),
        );

        let selection = retriever.relevant_context("u", "pizza", None).await;
        assert_eq!(selection.strategy, Strategy::KeywordRecency);
        assert!(selection.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_returns_nothing() {
        let now = Utc::now();
        let store = pizza_store(now, false).await;
        let retriever = ContextRetriever::new(store, None, RetrievalConfig::default());
        assert!(retriever
            .relevant_context_at("u", "pizza", Some(0), now)
            .await
            .is_empty());
    }
}
