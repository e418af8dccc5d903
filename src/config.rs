use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use url::Url;

pub const APP_NAME: &str = "lingua-recall";

pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSIONS: u32 = 1536;

const PLACEHOLDER_API_KEY: &str = "placeholder_openai_api_key_replace_with_real_key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: u32,
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

/// Knobs for context selection. The defaults are the product's tuned values.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub keyword_weight: f64,
    pub recency_weight: f64,
    pub recency_window_days: i64,
    /// Drop embedding matches below this cosine similarity.
    pub min_similarity: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            keyword_weight: 0.7,
            recency_weight: 0.3,
            recency_window_days: 7,
            min_similarity: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    /// `None` disables embeddings; retrieval then always uses keyword scoring.
    pub embedding: Option<EmbeddingConfig>,
    pub retrieval: RetrievalConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            embedding: None,
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = get("LINGUA_DB_PATH").map(PathBuf::from);
        let store = match get("LINGUA_STORE").as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("sqlite") => StoreBackend::Sqlite {
                path: match db_path {
                    Some(path) => path,
                    None => default_db_path(&lookup)?,
                },
            },
            Some(other) => bail!("Unknown LINGUA_STORE backend: {}", other),
            None => match db_path {
                Some(path) => StoreBackend::Sqlite { path },
                None => StoreBackend::Memory,
            },
        };

        let embedding = match get("OPENAI_API_KEY") {
            Some(key) if key != PLACEHOLDER_API_KEY => {
                let base_url = get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_BASE_URL.to_string());
                Url::parse(&base_url)
                    .with_context(|| format!("Invalid OPENAI_BASE_URL: {}", base_url))?;
                let dimensions = match get("LINGUA_EMBEDDING_DIMENSIONS") {
                    Some(v) => v
                        .parse()
                        .with_context(|| format!("Invalid LINGUA_EMBEDDING_DIMENSIONS: {}", v))?,
                    None => DEFAULT_EMBEDDING_DIMENSIONS,
                };
                Some(EmbeddingConfig {
                    api_key: key,
                    base_url: base_url.trim_end_matches('/').to_string(),
                    model: get("LINGUA_EMBEDDING_MODEL")
                        .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                    dimensions,
                })
            }
            _ => None,
        };

        let mut retrieval = RetrievalConfig::default();
        if let Some(v) = get("LINGUA_CONTEXT_LIMIT") {
            retrieval.default_limit = v
                .parse()
                .with_context(|| format!("Invalid LINGUA_CONTEXT_LIMIT: {}", v))?;
        }
        if let Some(v) = get("LINGUA_MIN_SIMILARITY") {
            retrieval.min_similarity = Some(
                v.parse()
                    .with_context(|| format!("Invalid LINGUA_MIN_SIMILARITY: {}", v))?,
            );
        }

        Ok(Self {
            store,
            embedding,
            retrieval,
        })
    }
}

fn default_db_path<F>(lookup: &F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let data_dir = match lookup("XDG_DATA_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = lookup("HOME").context("Neither XDG_DATA_HOME nor HOME is set")?;
            PathBuf::from(home).join(".local/share")
        }
    };
    Ok(data_dir.join(APP_NAME).join("history.db"))
}
