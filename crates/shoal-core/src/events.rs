//! Realtime event envelope protocol.
//!
//! Wire shape: `{"name": <event kind>, "data": <payload>, "connectionId": ..}`.
//! Delivery is at-least-once and unordered; nothing here may assume send
//! order or exactly-once. Unknown names and missing fields decode to
//! [`EnvelopeError`], which consumers treat as a skippable event, not a crash.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EnvelopeError;
use crate::models::{ConversationId, Message, MessageId};

/// The conversation a payload addresses, as carried on the wire.
///
/// Group payloads carry the group id; direct-message payloads carry the
/// receiver, and the identity is the canonical (author, receiver) pair —
/// both participants resolve the same `ConversationId` regardless of which
/// side authored the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationRef {
    Group { group_id: u64 },
    Direct { receiver_id: String },
}

impl ConversationRef {
    pub fn resolve(&self, author_id: &str) -> ConversationId {
        match self {
            ConversationRef::Group { group_id } => ConversationId::group(*group_id),
            ConversationRef::Direct { receiver_id } => {
                ConversationId::direct(author_id, receiver_id.clone())
            }
        }
    }
}

/// Payload of `message_sent`: the full authoritative message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentPayload {
    pub id: i64,
    pub author_id: String,
    pub content: String,
    /// Unix milliseconds, assigned by the persistence service.
    pub timestamp: u64,
    #[serde(flatten)]
    pub scope: ConversationRef,
    /// Client-generated correlation id, echoed back so the sender can match
    /// this event against its optimistic entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Uuid>,
}

impl SentPayload {
    pub fn conversation(&self) -> ConversationId {
        self.scope.resolve(&self.author_id)
    }

    pub fn into_message(self) -> Message {
        let conversation = self.conversation();
        Message {
            id: MessageId::Server(self.id),
            conversation,
            author_id: self.author_id,
            content: self.content,
            timestamp: self.timestamp,
        }
    }
}

/// Payload of `message_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditPayload {
    pub id: i64,
    pub author_id: String,
    pub content: String,
    #[serde(flatten)]
    pub scope: ConversationRef,
}

/// Payload of `message_deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TombstonePayload {
    pub id: i64,
    pub author_id: String,
    #[serde(flatten)]
    pub scope: ConversationRef,
}

/// Payload of `group_created` / `group_updated`, delivered on the private
/// per-user channel of every member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPayload {
    pub group_id: u64,
    pub name: String,
}

/// Closed sum over the fixed event kinds. Exhaustively matched everywhere;
/// names outside this set never construct a value (decode fails instead).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    MessageSent(SentPayload),
    MessageUpdated(EditPayload),
    MessageDeleted(TombstonePayload),
    GroupCreated(GroupPayload),
    GroupUpdated(GroupPayload),
}

impl ServerEvent {
    /// The conversation this event addresses, if it addresses one.
    pub fn conversation(&self) -> Option<ConversationId> {
        match self {
            ServerEvent::MessageSent(p) => Some(p.scope.resolve(&p.author_id)),
            ServerEvent::MessageUpdated(p) => Some(p.scope.resolve(&p.author_id)),
            ServerEvent::MessageDeleted(p) => Some(p.scope.resolve(&p.author_id)),
            ServerEvent::GroupCreated(_) | ServerEvent::GroupUpdated(_) => None,
        }
    }
}

/// Full envelope as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: ServerEvent,
    /// Publishing client connection, used for self-echo detection. Absent
    /// for server-originated broadcasts.
    #[serde(
        rename = "connectionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_id: Option<String>,
}

impl EventEnvelope {
    pub fn new(event: ServerEvent, connection_id: Option<String>) -> Self {
        Self {
            event,
            connection_id,
        }
    }

    pub fn decode(raw: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sent_event_round_trips() {
        let envelope = EventEnvelope::new(
            ServerEvent::MessageSent(SentPayload {
                id: 42,
                author_id: "alice".into(),
                content: "hi".into(),
                timestamp: 1_000,
                scope: ConversationRef::Group { group_id: 9 },
                nonce: None,
            }),
            Some("conn-1".into()),
        );

        let json = envelope.encode().unwrap();
        let back = EventEnvelope::decode(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn wire_shape_uses_name_data_connection_id() {
        let envelope = EventEnvelope::new(
            ServerEvent::MessageDeleted(TombstonePayload {
                id: 7,
                author_id: "alice".into(),
                scope: ConversationRef::Direct {
                    receiver_id: "bob".into(),
                },
            }),
            Some("conn-9".into()),
        );

        let value: serde_json::Value =
            serde_json::from_str(&envelope.encode().unwrap()).unwrap();
        assert_eq!(value["name"], "message_deleted");
        assert_eq!(value["data"]["id"], 7);
        assert_eq!(value["data"]["receiver_id"], "bob");
        assert_eq!(value["connectionId"], "conn-9");
    }

    #[test]
    fn unknown_name_is_a_decode_error() {
        let raw = r#"{"name":"message_reacted","data":{"id":1},"connectionId":"c"}"#;
        assert!(EventEnvelope::decode(raw).is_err());
    }

    #[test]
    fn missing_fields_are_a_decode_error() {
        let raw = r#"{"name":"message_sent","data":{"id":1}}"#;
        assert!(EventEnvelope::decode(raw).is_err());
    }

    #[test]
    fn missing_connection_id_is_allowed() {
        let raw = r#"{"name":"group_created","data":{"group_id":5,"name":"ops"}}"#;
        let envelope = EventEnvelope::decode(raw).unwrap();
        assert_eq!(envelope.connection_id, None);
        assert!(matches!(envelope.event, ServerEvent::GroupCreated(_)));
    }

    #[test]
    fn dm_scope_resolves_identically_for_both_participants() {
        // Same wire payload (author=bob, receiver=alice) seen by both sides.
        let payload = SentPayload {
            id: 1,
            author_id: "bob".into(),
            content: "hey".into(),
            timestamp: 10,
            scope: ConversationRef::Direct {
                receiver_id: "alice".into(),
            },
            nonce: None,
        };
        assert_eq!(payload.conversation(), ConversationId::direct("alice", "bob"));
        assert_eq!(payload.conversation(), ConversationId::direct("bob", "alice"));
    }

    #[test]
    fn scope_deserializes_group_vs_direct_by_fields() {
        let group: ConversationRef = serde_json::from_str(r#"{"group_id":3}"#).unwrap();
        assert_eq!(group, ConversationRef::Group { group_id: 3 });

        let dm: ConversationRef = serde_json::from_str(r#"{"receiver_id":"bob"}"#).unwrap();
        assert_eq!(
            dm,
            ConversationRef::Direct {
                receiver_id: "bob".into()
            }
        );
    }
}
