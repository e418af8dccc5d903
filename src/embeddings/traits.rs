use async_trait::async_trait;

use super::types::EmbeddingError;

/// Turns text into a fixed-length vector.
///
/// An `Ok` with an empty vector means "no embedding" and is handled the same
/// way as an error by callers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// `None` for an empty vector or a failed call; failures are logged.
    async fn embed_or_none(&self, text: &str) -> Option<Vec<f32>> {
        match self.embed(text).await {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(model = self.model(), "Embedding unavailable: {}", e);
                None
            }
        }
    }
}
