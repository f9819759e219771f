//! Wire message types for the push channel.
//!
//! [`Envelope`] is the structured unit exchanged over the channel. The wire
//! format matches what the portal backend emits — consumers on other
//! platforms depend on the exact field names and type strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse message types pushed by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// User-facing alert routed into the notification store.
    Notification,
    /// Entity state change (a trip departed, a parcel was scanned).
    Update,
    /// Operational alert for dispatcher dashboards.
    Alert,
    /// Cache/refresh hint for list screens.
    Sync,
}

/// All message type variants, for exhaustive testing.
pub const ALL_MESSAGE_TYPES: &[MessageType] = &[
    MessageType::Notification,
    MessageType::Update,
    MessageType::Alert,
    MessageType::Sync,
];

impl MessageType {
    /// The lowercase wire string, also used as the coarse routing key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Update => "update",
            Self::Alert => "alert",
            Self::Sync => "sync",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message exchanged over the push channel. Immutable once dispatched.
///
/// Wire shape:
/// ```json
/// { "type": "notification", "category": "error", "title": "Payment",
///   "message": "Charge declined", "data": {...}, "timestamp": 1722945600000 }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Coarse message type.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Free-text subcategory. For `notification` messages the bridge
    /// interprets success|error|warning|info.
    #[serde(default)]
    pub category: String,
    /// Optional short heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable body.
    pub message: String,
    /// Opaque payload — shape varies by message type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Producer clock, milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl Envelope {
    /// Build an envelope stamped with the local clock.
    pub fn new(kind: MessageType, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            category: category.into(),
            title: None,
            message: message.into(),
            data: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The two routing keys this envelope dispatches under.
    pub fn route_keys(&self) -> (RouteKey, RouteKey) {
        (
            RouteKey::Kind(self.kind),
            RouteKey::category(self.kind, self.category.clone()),
        )
    }
}

/// Subscription key: either a coarse message type or a `type:category` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RouteKey {
    Kind(MessageType),
    KindCategory(MessageType, String),
}

impl RouteKey {
    pub fn category(kind: MessageType, category: impl Into<String>) -> Self {
        Self::KindCategory(kind, category.into())
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kind(kind) => f.write_str(kind.as_str()),
            Self::KindCategory(kind, category) => write!(f, "{kind}:{category}"),
        }
    }
}
