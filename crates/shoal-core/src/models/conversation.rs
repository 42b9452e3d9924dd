use serde::{Deserialize, Serialize};
use std::fmt;

/// A canonicalized direct-message pair. The two participant ids are stored
/// sorted lexicographically, so either participant constructs the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectPair {
    lo: String,
    hi: String,
}

impl DirectPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let a = a.into();
        let b = b.into();
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    pub fn lo(&self) -> &str {
        &self.lo
    }

    pub fn hi(&self) -> &str {
        &self.hi
    }

    /// The participant that is not `user`, or `user` itself for a self-DM.
    pub fn peer_of<'a>(&'a self, user: &str) -> &'a str {
        if self.lo == user {
            &self.hi
        } else {
            &self.lo
        }
    }
}

/// Identity of a conversation: the cache key and channel-name seed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationId {
    Group(u64),
    Direct(DirectPair),
}

impl ConversationId {
    pub fn group(id: u64) -> Self {
        ConversationId::Group(id)
    }

    /// Direct-message identity from any ordering of the two participants.
    pub fn direct(a: impl Into<String>, b: impl Into<String>) -> Self {
        ConversationId::Direct(DirectPair::new(a, b))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationId::Group(id) => write!(f, "group/{id}"),
            ConversationId::Direct(pair) => write!(f, "dm/{}/{}", pair.lo, pair.hi),
        }
    }
}
