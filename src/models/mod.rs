pub mod message;
pub mod session;

pub use message::{Message, MessageMetadata, NewMessage, Role};
pub use session::Session;
