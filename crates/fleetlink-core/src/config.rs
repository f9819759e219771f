use std::time::Duration;

/// Push channel configuration.
pub struct ChannelConfig {
    /// WebSocket endpoint, e.g. `ws://ops.example.gov/live`.
    pub endpoint: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts before the channel gives up.
    pub max_reconnect_attempts: u32,
    /// Envelopes held while disconnected before oldest-drop eviction.
    pub outbound_queue_capacity: usize,
    /// In-flight send buffer between callers and the socket task.
    pub send_buffer: usize,
}

impl ChannelConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:9091/live".into(),
            reconnect_delay: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            outbound_queue_capacity: 64,
            send_buffer: 256,
        }
    }
}

/// Notification store configuration.
pub struct NotifyConfig {
    /// Maximum notifications retained; oldest evicted beyond this.
    pub max_visible: usize,
    /// Time-to-live applied to auto-closing notifications.
    pub default_ttl: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_visible: 5,
            default_ttl: Duration::from_secs(4),
        }
    }
}
