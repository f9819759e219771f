//! Wiring layer: connects the push channel to the notification store and
//! exposes the subsystem's public API as one explicitly-owned instance.

mod bridge;
mod service;

pub use bridge::NotificationBridge;
pub use service::Realtime;
