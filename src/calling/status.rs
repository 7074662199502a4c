//! Derived status flags, computed from the snapshot on every read.

use serde::Serialize;

use super::state::CallSession;
use super::types::CallState;

impl CallSession {
    /// Connecting, Connected or Reconnecting.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            CallState::Connecting | CallState::Connected | CallState::Reconnecting
        )
    }

    pub fn is_connected(&self) -> bool {
        self.state == CallState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state == CallState::Connecting
    }

    pub fn is_reconnecting(&self) -> bool {
        self.state == CallState::Reconnecting
    }

    pub fn is_disconnecting(&self) -> bool {
        self.state == CallState::Disconnecting
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn should_show_reconnecting(&self) -> bool {
        self.state == CallState::Reconnecting
    }

    pub fn can_reconnect(&self) -> bool {
        self.reconnection_attempts < self.max_reconnection_attempts
    }

    /// Fraction of the reconnection budget used, in `[0, 1]`.
    pub fn reconnection_progress(&self) -> f64 {
        if self.max_reconnection_attempts == 0 {
            return 0.0;
        }
        let ratio = self.reconnection_attempts as f64 / self.max_reconnection_attempts as f64;
        ratio.clamp(0.0, 1.0)
    }

    /// `m:ss`, or `h:mm:ss` once the call passes an hour.
    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration)
    }

    /// Serializable copy of every flag, for JSON output.
    pub fn flags(&self) -> CallFlags {
        CallFlags {
            is_active: self.is_active(),
            is_connected: self.is_connected(),
            is_connecting: self.is_connecting(),
            is_reconnecting: self.is_reconnecting(),
            is_disconnecting: self.is_disconnecting(),
            has_error: self.has_error(),
            should_show_reconnecting: self.should_show_reconnecting(),
            can_reconnect: self.can_reconnect(),
        }
    }
}

/// Point-in-time copy of the derived flags. Built on demand, never cached on
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFlags {
    pub is_active: bool,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub is_reconnecting: bool,
    pub is_disconnecting: bool,
    pub has_error: bool,
    pub should_show_reconnecting: bool,
    pub can_reconnect: bool,
}

pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
