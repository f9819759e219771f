//! The push channel: a reconnecting full-duplex WebSocket client, a typed
//! publish/subscribe router, and the bounded outbound queue that preserves
//! sends across disconnects.

pub mod connection;
pub mod queue;
pub mod router;

pub use connection::{ChannelEvent, ConnectionState, PushChannel};
pub use queue::OutboundQueue;
pub use router::{MessageRouter, Subscription};
