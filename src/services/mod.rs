pub mod context;
pub mod export;
pub mod history;
pub mod tutor;

pub use context::format_context_summary;
pub use history::ChatHistoryService;
pub use tutor::{build_tutor_prompt, parse_tutor_reply, TutorReply, TutorRequest};
