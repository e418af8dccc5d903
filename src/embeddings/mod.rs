pub mod openai;
pub mod traits;
pub mod types;

pub use openai::OpenAiEmbeddingProvider;
pub use traits::EmbeddingProvider;
pub use types::EmbeddingError;
