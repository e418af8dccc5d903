pub mod app;
pub mod config;
pub mod embeddings;
pub mod models;
pub mod retrieval;
pub mod services;
pub mod store;

pub use app::AppContext;
pub use config::AppConfig;
pub use retrieval::{ContextRetriever, ContextSelection, Strategy};
pub use services::ChatHistoryService;
