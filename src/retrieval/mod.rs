pub mod retriever;
pub mod scoring;

pub use retriever::{ContextRetriever, ContextSelection, ScoredMessage, Strategy};
