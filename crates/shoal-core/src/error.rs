use thiserror::Error;

/// Errors surfaced by the persistence/query service.
///
/// Authorization failures (`Forbidden`, `BadRequest`) are terminal for the
/// initiating operation and are never retried or broadcast; network failures
/// on backfill leave the conversation in a retryable state.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from the pub/sub transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("subscribe failed on {channel}: {reason}")]
    Subscribe { channel: String, reason: String },
    #[error("publish failed on {channel}: {reason}")]
    Publish { channel: String, reason: String },
}

/// A realtime payload that could not be decoded (unknown event name or
/// missing fields). Always recoverable: the reconciler logs and skips it.
#[derive(Debug, Error)]
#[error("malformed event envelope: {0}")]
pub struct EnvelopeError(#[from] serde_json::Error);
