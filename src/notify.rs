//! Notification events, the toast stack, and native notification hooks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::actions::Action;

pub const DEFAULT_TOAST_MS: u64 = 5000;
pub const DEFAULT_SYSTEM_NOTIFICATION_MS: u64 = 10_000;
pub const MAX_VISIBLE_TOASTS: usize = 4;

/// Event types that only ever show in-app.
pub const SILENT_TYPES: &[&str] = &["toast", "silent", "progress"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationEvent {
    pub id: u64,
    pub title: String,
    pub message: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration: Option<u64>,
    pub action: Option<String>,
    pub action_data: Option<Value>,
    pub system: bool,
    pub timestamp: Option<String>,
    /// Side-effect hints, applied best-effort on arrival.
    pub open_window: Option<String>,
    pub wallpaper: Option<String>,
    pub tidy_desktop: bool,
}

impl NotificationEvent {
    pub fn local(title: impl Into<String>, message: impl Into<String>, icon: &str, kind: &str) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            icon: icon.to_string(),
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.duration.unwrap_or(DEFAULT_TOAST_MS))
    }

    pub fn is_silent(&self) -> bool {
        SILENT_TYPES.contains(&self.kind.as_str())
    }

    pub fn wants_native(&self, permission_granted: bool) -> bool {
        permission_granted && !self.is_silent()
    }

    pub fn parsed_action(&self) -> Action {
        Action::parse(self.action.as_deref(), self.action_data.as_ref())
    }
}

/// Native OS-level notification sink.
pub trait SystemNotifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, timeout: Duration);
}

#[derive(Debug, Default)]
pub struct NullNotifier;

impl SystemNotifier for NullNotifier {
    fn notify(&self, _title: &str, _message: &str, _timeout: Duration) {}
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub key: u64,
    pub event: NotificationEvent,
    pub expires_at: Instant,
}

/// In-app toasts, newest last. Each toast dismisses itself at `expires_at`.
#[derive(Debug, Default)]
pub struct ToastStack {
    toasts: VecDeque<Toast>,
    next_key: u64,
}

impl ToastStack {
    pub fn push(&mut self, event: NotificationEvent, now: Instant) -> u64 {
        self.next_key += 1;
        let key = self.next_key;
        let expires_at = now + event.toast_duration();
        self.toasts.push_back(Toast {
            key,
            event,
            expires_at,
        });
        while self.toasts.len() > MAX_VISIBLE_TOASTS {
            self.toasts.pop_front();
        }
        key
    }

    pub fn expire(&mut self, now: Instant) {
        self.toasts.retain(|t| t.expires_at > now);
    }

    pub fn dismiss(&mut self, key: u64) -> Option<Toast> {
        let pos = self.toasts.iter().position(|t| t.key == key)?;
        self.toasts.remove(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}
