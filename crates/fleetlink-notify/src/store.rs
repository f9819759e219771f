//! The notification store.
//!
//! Entries live in an id-indexed map plus an insertion-order queue. Every
//! auto-closing entry owns a one-shot expiry task; any removal — manual
//! dismissal, expiry, or bound eviction — aborts that task, and the expiry
//! path re-checks membership under the lock, so a stale timer can never act
//! on a departed id.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use fleetlink_core::{NotificationId, NotifyConfig};

/// Severity of a user-facing alert, mirrored in the portal's styling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

impl NotificationKind {
    /// Map a wire category to a kind. Unknown categories become `Info`.
    pub fn from_category(category: &str) -> Self {
        match category {
            "success" => Self::Success,
            "error" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored alert.
#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub auto_close: bool,
    #[serde(serialize_with = "duration_ms", rename = "ttl_ms")]
    pub ttl: Duration,
}

fn duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Input to [`NotificationCenter::push`]. Unset fields take the kind-aware
/// defaults: `error` is sticky, everything else auto-closes after the
/// configured TTL.
pub struct NewNotification {
    kind: NotificationKind,
    title: Option<String>,
    message: String,
    auto_close: Option<bool>,
    duration: Option<Duration>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: None,
            message: message.into(),
            auto_close: None,
            duration: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn auto_close(mut self, auto_close: bool) -> Self {
        self.auto_close = Some(auto_close);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

struct Entry {
    notification: Notification,
    expiry: Option<AbortHandle>,
}

#[derive(Default)]
struct CenterState {
    order: VecDeque<NotificationId>,
    entries: HashMap<NotificationId, Entry>,
}

struct CenterShared {
    config: NotifyConfig,
    state: Mutex<CenterState>,
    revision: watch::Sender<u64>,
}

/// Owner of the alert list. Cheap to clone; clones share state. The list is
/// mutated only through this API — readers take snapshots, never references.
///
/// Must live inside a tokio runtime: auto-closing entries spawn their expiry
/// task on push.
#[derive(Clone)]
pub struct NotificationCenter {
    shared: Arc<CenterShared>,
}

impl NotificationCenter {
    pub fn new(config: NotifyConfig) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(CenterShared {
                config,
                state: Mutex::new(CenterState::default()),
                revision,
            }),
        }
    }

    /// Store an alert, evicting the oldest entries beyond the bound.
    /// Returns the new alert's id.
    pub fn push(&self, new: NewNotification) -> NotificationId {
        let id = NotificationId::new();
        let auto_close = new
            .auto_close
            .unwrap_or(new.kind != NotificationKind::Error);
        let ttl = new.duration.unwrap_or(self.shared.config.default_ttl);

        let notification = Notification {
            id: id.clone(),
            kind: new.kind,
            title: new.title,
            message: new.message,
            created_at: Utc::now(),
            auto_close,
            ttl,
        };

        let expiry = auto_close.then(|| {
            let shared = Arc::downgrade(&self.shared);
            let expire_id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                expire(&shared, &expire_id);
            })
            .abort_handle()
        });

        {
            let mut state = self.shared.state.lock();
            state.order.push_back(id.clone());
            state.entries.insert(id.clone(), Entry { notification, expiry });

            while state.order.len() > self.shared.config.max_visible {
                let Some(oldest) = state.order.pop_front() else { break };
                if let Some(entry) = state.entries.remove(&oldest) {
                    if let Some(handle) = entry.expiry {
                        handle.abort();
                    }
                    tracing::debug!(id = %oldest, "notification evicted");
                }
            }
        }

        self.bump();
        id
    }

    /// Remove an alert. Idempotent: dismissing an expired, evicted, or
    /// already-dismissed id is a no-op.
    pub fn dismiss(&self, id: &NotificationId) {
        if self.remove(id) {
            self.bump();
        }
    }

    /// Drop every alert unconditionally.
    pub fn clear(&self) {
        {
            let mut state = self.shared.state.lock();
            for entry in state.entries.values() {
                if let Some(handle) = &entry.expiry {
                    handle.abort();
                }
            }
            state.entries.clear();
            state.order.clear();
        }
        self.bump();
    }

    /// Current alerts, oldest first.
    pub fn snapshot(&self) -> Vec<Notification> {
        let state = self.shared.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|entry| entry.notification.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Revision counter bumped on every mutation; await `changed()` to
    /// observe updates without holding a reference into the store.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    // ── Convenience wrappers ─────────────────────────────────────────

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.push(NewNotification::new(NotificationKind::Success, message))
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.push(NewNotification::new(NotificationKind::Error, message))
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.push(NewNotification::new(NotificationKind::Warning, message))
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.push(NewNotification::new(NotificationKind::Info, message))
    }

    fn remove(&self, id: &NotificationId) -> bool {
        let mut state = self.shared.state.lock();
        let Some(entry) = state.entries.remove(id) else {
            return false;
        };
        if let Some(handle) = entry.expiry {
            handle.abort();
        }
        state.order.retain(|queued| queued != id);
        true
    }

    fn bump(&self) {
        self.shared.revision.send_modify(|revision| *revision += 1);
    }
}

/// Expiry path. Membership is re-checked under the lock; a dismissed or
/// evicted id is simply gone by the time the timer fires.
fn expire(shared: &Weak<CenterShared>, id: &NotificationId) {
    let Some(shared) = shared.upgrade() else { return };
    let removed = {
        let mut state = shared.state.lock();
        match state.entries.remove(id) {
            Some(_) => {
                state.order.retain(|queued| queued != id);
                true
            }
            None => false,
        }
    };
    if removed {
        tracing::debug!(id = %id, "notification expired");
        shared.revision.send_modify(|revision| *revision += 1);
    }
}
