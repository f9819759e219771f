//! Bridge between the channel and the notification store.
//!
//! Two inputs: inbound `notification`-type envelopes become alerts with the
//! category mapped to a severity, and channel status events surface
//! persistent connection loss as exactly one sticky error.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use fleetlink_channel::{ChannelEvent, MessageRouter, Subscription};
use fleetlink_core::{Envelope, MessageType, RouteKey};
use fleetlink_notify::{NewNotification, NotificationCenter, NotificationKind};

/// Forwards server-pushed alerts and connection loss into the store.
pub struct NotificationBridge {
    subscription: Subscription,
    status_task: JoinHandle<()>,
}

impl NotificationBridge {
    /// Register on the router and start watching channel status. Must be
    /// called within a tokio runtime.
    pub fn attach(
        router: &MessageRouter,
        events: broadcast::Receiver<ChannelEvent>,
        center: NotificationCenter,
    ) -> Self {
        let frame_center = center.clone();
        let subscription = router.subscribe(
            RouteKey::Kind(MessageType::Notification),
            move |envelope| forward(&frame_center, envelope),
        );

        let status_task = tokio::spawn(watch_status(events, center));

        Self {
            subscription,
            status_task,
        }
    }

    /// Unregister from the router and stop the status watcher.
    pub fn detach(self) {
        self.subscription.unsubscribe();
        self.status_task.abort();
    }
}

fn forward(center: &NotificationCenter, envelope: &Envelope) {
    let kind = NotificationKind::from_category(&envelope.category);
    let mut new = NewNotification::new(kind, envelope.message.clone());
    if let Some(title) = &envelope.title {
        new = new.title(title.clone());
    }
    let id = center.push(new);
    tracing::debug!(id = %id, kind = %kind, "alert bridged from channel");
}

async fn watch_status(mut events: broadcast::Receiver<ChannelEvent>, center: NotificationCenter) {
    loop {
        match events.recv().await {
            Ok(ChannelEvent::Lost) => {
                // Retry budget exhausted: one sticky, user-dismissible alert.
                center.push(
                    NewNotification::new(
                        NotificationKind::Error,
                        "Connection to the operations service was lost. \
                         Displayed data may be stale.",
                    )
                    .title("Connection lost"),
                );
                return;
            }
            Ok(ChannelEvent::Open { resumed: true }) => {
                center.push(NewNotification::new(
                    NotificationKind::Info,
                    "Connection restored.",
                ));
            }
            Ok(ChannelEvent::Closed) => return,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "status bridge lagged behind channel events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
