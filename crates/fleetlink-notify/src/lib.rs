//! Bounded, auto-expiring store of user-facing alerts.

mod store;

pub use store::{NewNotification, Notification, NotificationCenter, NotificationKind};
