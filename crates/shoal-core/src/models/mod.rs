pub mod conversation;
pub mod message;

pub use conversation::{ConversationId, DirectPair};
pub use message::{Message, MessageId};
