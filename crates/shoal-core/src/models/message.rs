use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::ConversationId;

/// Message identity. `Server` ids are assigned by the persistence service;
/// `Local` ids mark optimistic sends that have not been confirmed yet and are
/// replaced in place (never duplicated) once the authoritative id is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    Server(i64),
    Local(Uuid),
}

impl MessageId {
    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation: ConversationId,
    pub author_id: String,
    pub content: String,
    /// Unix milliseconds.
    pub timestamp: u64,
}

impl Message {
    /// An optimistic, not-yet-confirmed message authored by the viewer.
    pub fn provisional(
        conversation: ConversationId,
        author_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: u64,
        local_id: Uuid,
    ) -> Self {
        Self {
            id: MessageId::Local(local_id),
            conversation,
            author_id: author_id.into(),
            content: content.into(),
            timestamp,
        }
    }
}
