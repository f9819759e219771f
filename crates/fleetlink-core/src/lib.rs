//! Shared types for the fleetlink real-time subsystem: wire envelopes,
//! branded identifiers, error taxonomy, configuration, and the credential
//! seam used to authorize the push channel.

pub mod config;
pub mod credentials;
pub mod envelope;
pub mod errors;
pub mod ids;

pub use config::{ChannelConfig, NotifyConfig};
pub use credentials::{Anonymous, CredentialProvider, StaticToken};
pub use envelope::{Envelope, MessageType, RouteKey};
pub use errors::ChannelError;
pub use ids::{NotificationId, SubscriptionId};
