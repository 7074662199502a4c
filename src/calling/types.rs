//! Value types shared by the call state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Call lifecycle state. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    Failed,
    Ended,
}

impl CallState {
    pub const ALL: [CallState; 7] = [
        CallState::Idle,
        CallState::Connecting,
        CallState::Connected,
        CallState::Reconnecting,
        CallState::Disconnecting,
        CallState::Failed,
        CallState::Ended,
    ];

    /// Ended and Failed: nothing meaningful happens until a new call starts.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Connecting => "connecting",
            CallState::Connected => "connected",
            CallState::Reconnecting => "reconnecting",
            CallState::Disconnecting => "disconnecting",
            CallState::Failed => "failed",
            CallState::Ended => "ended",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media kind of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Voice,
    Video,
    ScreenShare,
}

impl CallType {
    pub fn label(&self) -> &'static str {
        match self {
            CallType::Voice => "Voice",
            CallType::Video => "Video",
            CallType::ScreenShare => "Screen share",
        }
    }
}

impl FromStr for CallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "voice" | "audio" => Ok(CallType::Voice),
            "video" => Ok(CallType::Video),
            "screen_share" | "screenshare" | "screen" => Ok(CallType::ScreenShare),
            other => Err(format!(
                "unknown call type '{}' (expected voice, video or screen_share)",
                other
            )),
        }
    }
}

/// Reported link quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Fair => "fair",
            ConnectionQuality::Poor => "poor",
        }
    }
}

/// Participant record. Opaque to the state machine: it is stored and
/// replaced wholesale, never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_video_enabled: bool,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(display_name.into()),
            is_muted: false,
            is_video_enabled: false,
        }
    }
}

/// Error descriptor stored on the session when a connection drops or a call
/// fails. Carried as data, surfaced through `has_error` and the indicator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct CallError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}
