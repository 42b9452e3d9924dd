pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod pubsub;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod subscriptions;

pub use api::{MessageRecord, PersistenceClient};
pub use channel::ChannelName;
pub use config::CoreConfig;
pub use error::{EnvelopeError, RpcError, TransportError};
pub use events::{EventEnvelope, ServerEvent};
pub use models::{ConversationId, Message, MessageId};
pub use pubsub::{EventSink, InMemoryBus, PubSubTransport, SubscriptionId};
pub use reconciler::{Reconciler, SideEffect};
pub use session::ChatSession;
pub use store::{InsertOutcome, LoadState, ProjectionStore};
pub use subscriptions::SubscriptionMultiplexer;
