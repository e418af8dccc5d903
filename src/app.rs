use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{AppConfig, StoreBackend};
use crate::embeddings::{EmbeddingProvider, OpenAiEmbeddingProvider};
use crate::services::ChatHistoryService;
use crate::store::{InMemoryStore, MessageStore, SqliteStore};

/// Long-lived handles shared by every request. Built once at startup.
pub struct AppContext {
    pub config: AppConfig,
    pub history: Arc<ChatHistoryService>,
}

impl AppContext {
    pub fn init(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn MessageStore> = match &config.store {
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
            StoreBackend::Sqlite { path } => Arc::new(
                SqliteStore::open(path).context("Failed to initialize chat history database")?,
            ),
        };

        let embedder: Option<Arc<dyn EmbeddingProvider>> = config
            .embedding
            .clone()
            .map(|cfg| Arc::new(OpenAiEmbeddingProvider::new(cfg)) as Arc<dyn EmbeddingProvider>);

        tracing::info!(
            store = store.backend_name(),
            embeddings = embedder.as_ref().map(|e| e.model()).unwrap_or("disabled"),
            "Chat history initialized"
        );

        let history = Arc::new(ChatHistoryService::new(
            store,
            embedder,
            config.retrieval.clone(),
        ));

        Ok(Self { config, history })
    }
}
