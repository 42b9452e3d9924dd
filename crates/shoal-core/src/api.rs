//! Persistence/query service seam.
//!
//! The database and its queries are an external collaborator; the core talks
//! to it through an object-safe trait with boxed futures so embedders can
//! supply an RPC client, a test fake, or anything in between.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RpcError;
use crate::models::{ConversationId, Message, MessageId};

/// A message as stored by the persistence service. Conversation identity is
/// attached by the caller, which already knows which conversation it queried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub author_id: String,
    pub content: String,
    /// Unix milliseconds, assigned at write time.
    pub timestamp: u64,
}

impl MessageRecord {
    pub fn into_message(self, conversation: ConversationId) -> Message {
        Message {
            id: MessageId::Server(self.id),
            conversation,
            author_id: self.author_id,
            content: self.content,
            timestamp: self.timestamp,
        }
    }
}

pub trait PersistenceClient: Send + Sync {
    /// Fetch up to `count` messages strictly older than `cursor` (newest
    /// history when `cursor` is `None`), newest first.
    fn fetch_messages<'a>(
        &'a self,
        conversation: &'a ConversationId,
        cursor: Option<u64>,
        count: usize,
    ) -> BoxFuture<'a, Result<Vec<MessageRecord>, RpcError>>;

    /// Persist a new message. The service assigns id and timestamp and, after
    /// the write succeeds, publishes the `message_sent` event carrying back
    /// `nonce` for self-echo correlation.
    fn send_message<'a>(
        &'a self,
        conversation: &'a ConversationId,
        content: &'a str,
        nonce: Uuid,
    ) -> BoxFuture<'a, Result<MessageRecord, RpcError>>;

    /// Edit a message. Authorized for the original author only.
    fn update_message<'a>(
        &'a self,
        conversation: &'a ConversationId,
        id: i64,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), RpcError>>;

    /// Delete a message. Authorized for the original author only.
    fn delete_message<'a>(
        &'a self,
        conversation: &'a ConversationId,
        id: i64,
    ) -> BoxFuture<'a, Result<(), RpcError>>;

    /// Advance the server-side last-read marker for the viewer.
    fn acknowledge_read<'a>(
        &'a self,
        conversation: &'a ConversationId,
        timestamp: u64,
    ) -> BoxFuture<'a, Result<(), RpcError>>;
}
