use std::sync::Arc;

use fleetlink_channel::{ChannelEvent, ConnectionState, MessageRouter, PushChannel, Subscription};
use fleetlink_core::{
    ChannelConfig, ChannelError, CredentialProvider, Envelope, MessageType, NotificationId,
    NotifyConfig, RouteKey,
};
use fleetlink_notify::{NewNotification, NotificationCenter};
use tokio::sync::broadcast;

use crate::bridge::NotificationBridge;

/// The real-time subsystem as one explicitly-constructed, owned instance.
///
/// Construction wires the channel, router, notification store, and bridge
/// together; dropping or [`shutdown`](Self::shutdown) tears them down. There
/// is no process-wide instance — the portal creates one and passes it where
/// needed. Must be created within a tokio runtime.
pub struct Realtime {
    channel: PushChannel,
    router: MessageRouter,
    center: NotificationCenter,
    bridge: Option<NotificationBridge>,
}

impl Realtime {
    pub fn new(
        channel_config: ChannelConfig,
        notify_config: NotifyConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let router = MessageRouter::new();
        let channel = PushChannel::new(channel_config, credentials, router.clone());
        let center = NotificationCenter::new(notify_config);
        let bridge = NotificationBridge::attach(&router, channel.events(), center.clone());

        Self {
            channel,
            router,
            center,
            bridge: Some(bridge),
        }
    }

    // ── Channel ──────────────────────────────────────────────────────

    /// See [`PushChannel::connect`].
    pub async fn connect(&self) -> Result<(), ChannelError> {
        self.channel.connect().await
    }

    /// See [`PushChannel::disconnect`].
    pub async fn disconnect(&self) {
        self.channel.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn send(&self, envelope: Envelope) {
        self.channel.send(envelope);
    }

    /// Connection status events, for consumers beyond the built-in bridge.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.channel.events()
    }

    // ── Routing ──────────────────────────────────────────────────────

    /// Subscribe to every envelope of a coarse message type.
    pub fn subscribe(
        &self,
        kind: MessageType,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Subscription {
        self.router.subscribe(RouteKey::Kind(kind), handler)
    }

    /// Subscribe to a `type:category` pair only.
    pub fn subscribe_category(
        &self,
        kind: MessageType,
        category: impl Into<String>,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Subscription {
        self.router.subscribe(RouteKey::category(kind, category), handler)
    }

    // ── Notifications ────────────────────────────────────────────────

    /// The alert store, for snapshots and change watching.
    pub fn notifications(&self) -> &NotificationCenter {
        &self.center
    }

    pub fn notify(&self, new: NewNotification) -> NotificationId {
        self.center.push(new)
    }

    pub fn dismiss(&self, id: &NotificationId) {
        self.center.dismiss(id);
    }

    pub fn clear_notifications(&self) {
        self.center.clear();
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.center.success(message)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.center.error(message)
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.center.warning(message)
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.center.info(message)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Disconnect and tear down the bridge tasks.
    pub async fn shutdown(mut self) {
        self.channel.disconnect().await;
        if let Some(bridge) = self.bridge.take() {
            bridge.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlink_core::Anonymous;
    use fleetlink_notify::NotificationKind;

    fn service() -> Realtime {
        Realtime::new(
            ChannelConfig::new("ws://127.0.0.1:1/live"),
            NotifyConfig::default(),
            Arc::new(Anonymous),
        )
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let realtime = service();
        assert!(!realtime.is_connected());
        assert_eq!(realtime.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn direct_notifications_pass_through() {
        let realtime = service();

        let id = realtime.error("charge declined");
        realtime.success("saved");
        assert_eq!(realtime.notifications().len(), 2);

        realtime.dismiss(&id);
        assert_eq!(realtime.notifications().len(), 1);

        realtime.clear_notifications();
        assert!(realtime.notifications().is_empty());
    }

    #[tokio::test]
    async fn notify_applies_builder_fields() {
        let realtime = service();
        realtime.notify(
            NewNotification::new(NotificationKind::Warning, "low balance").title("Payments"),
        );

        let snapshot = realtime.notifications().snapshot();
        assert_eq!(snapshot[0].title.as_deref(), Some("Payments"));
    }

    #[tokio::test]
    async fn subscriptions_route_through_shared_router() {
        let realtime = service();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let sub = realtime.subscribe(MessageType::Update, move |env| {
            sink.lock().push(env.message.clone());
        });

        // No transport involved: publish straight through the router.
        realtime
            .router
            .publish(&Envelope::new(MessageType::Update, "trip", "departed"));
        assert_eq!(*seen.lock(), vec!["departed"]);

        sub.unsubscribe();
        realtime
            .router
            .publish(&Envelope::new(MessageType::Update, "trip", "again"));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let realtime = service();
        realtime.shutdown().await;
    }
}
