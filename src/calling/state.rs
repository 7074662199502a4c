//! Call session snapshot and the pure transition function over it.
//!
//! The reducer accepts every action in every state. Sequencing is the job of
//! the controller in `session.rs`, which is the only code that dispatches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{CallError, CallState, CallType, ConnectionQuality, Participant};

/// Reconnection attempts allowed before a failed reconnection becomes terminal.
pub const DEFAULT_MAX_RECONNECTION_ATTEMPTS: u32 = 5;

/// Snapshot of the single tracked call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub state: CallState,
    pub call_type: Option<CallType>,
    pub room_id: Option<String>,
    pub is_host: bool,
    pub participants: Vec<Participant>,
    pub start_time: Option<DateTime<Utc>>,
    /// Whole seconds since `start_time`, refreshed by the duration ticker.
    pub duration: u64,
    pub connection_quality: ConnectionQuality,
    pub reconnection_attempts: u32,
    pub max_reconnection_attempts: u32,
    pub error: Option<CallError>,
}

impl CallSession {
    /// Pristine Idle session with the given reconnection policy.
    pub fn new(max_reconnection_attempts: u32) -> Self {
        Self {
            state: CallState::Idle,
            call_type: None,
            room_id: None,
            is_host: false,
            participants: Vec::new(),
            start_time: None,
            duration: 0,
            connection_quality: ConnectionQuality::default(),
            reconnection_attempts: 0,
            max_reconnection_attempts,
            error: None,
        }
    }

    /// Pristine shape in a terminal state. The policy value survives.
    fn reset_to(&self, state: CallState) -> Self {
        Self {
            state,
            ..Self::new(self.max_reconnection_attempts)
        }
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECONNECTION_ATTEMPTS)
    }
}

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StartConnecting {
        call_type: CallType,
        room_id: String,
        is_host: bool,
    },
    ConnectionEstablished {
        participants: Vec<Participant>,
        start_time: DateTime<Utc>,
    },
    ConnectionLost {
        error: Option<CallError>,
    },
    ReconnectionAttempt,
    ReconnectionSuccess,
    ReconnectionFailed {
        error: Option<CallError>,
    },
    StartDisconnecting,
    CallEnded,
    CallFailed {
        error: Option<CallError>,
    },
    UpdateParticipants {
        participants: Vec<Participant>,
    },
    UpdateQuality {
        quality: ConnectionQuality,
    },
    SetCallType {
        call_type: CallType,
    },
    UpdateDuration {
        duration: u64,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartConnecting { .. } => "START_CONNECTING",
            Action::ConnectionEstablished { .. } => "CONNECTION_ESTABLISHED",
            Action::ConnectionLost { .. } => "CONNECTION_LOST",
            Action::ReconnectionAttempt => "RECONNECTION_ATTEMPT",
            Action::ReconnectionSuccess => "RECONNECTION_SUCCESS",
            Action::ReconnectionFailed { .. } => "RECONNECTION_FAILED",
            Action::StartDisconnecting => "START_DISCONNECTING",
            Action::CallEnded => "CALL_ENDED",
            Action::CallFailed { .. } => "CALL_FAILED",
            Action::UpdateParticipants { .. } => "UPDATE_PARTICIPANTS",
            Action::UpdateQuality { .. } => "UPDATE_QUALITY",
            Action::SetCallType { .. } => "SET_CALL_TYPE",
            Action::UpdateDuration { .. } => "UPDATE_DURATION",
        }
    }
}

/// Apply `action` to `session`, returning the next snapshot.
pub fn reduce(session: &CallSession, action: Action) -> CallSession {
    match action {
        Action::StartConnecting {
            call_type,
            room_id,
            is_host,
        } => CallSession {
            state: CallState::Connecting,
            call_type: Some(call_type),
            room_id: Some(room_id),
            is_host,
            error: None,
            reconnection_attempts: 0,
            ..session.clone()
        },
        Action::ConnectionEstablished {
            participants,
            start_time,
        } => CallSession {
            state: CallState::Connected,
            start_time: Some(start_time),
            participants,
            error: None,
            reconnection_attempts: 0,
            ..session.clone()
        },
        Action::ConnectionLost { error } => CallSession {
            state: CallState::Reconnecting,
            connection_quality: ConnectionQuality::Poor,
            error,
            ..session.clone()
        },
        Action::ReconnectionAttempt => CallSession {
            reconnection_attempts: session.reconnection_attempts.saturating_add(1),
            ..session.clone()
        },
        Action::ReconnectionSuccess => CallSession {
            state: CallState::Connected,
            connection_quality: ConnectionQuality::Good,
            error: None,
            reconnection_attempts: 0,
            ..session.clone()
        },
        Action::ReconnectionFailed { error } => {
            if session.reconnection_attempts >= session.max_reconnection_attempts {
                CallSession {
                    error,
                    ..session.reset_to(CallState::Failed)
                }
            } else {
                CallSession {
                    state: CallState::Reconnecting,
                    error,
                    ..session.clone()
                }
            }
        }
        Action::StartDisconnecting => CallSession {
            state: CallState::Disconnecting,
            ..session.clone()
        },
        Action::CallEnded => CallSession {
            duration: session.duration,
            ..session.reset_to(CallState::Ended)
        },
        Action::CallFailed { error } => CallSession {
            error,
            ..session.reset_to(CallState::Failed)
        },
        Action::UpdateParticipants { participants } => CallSession {
            participants,
            ..session.clone()
        },
        Action::UpdateQuality { quality } => CallSession {
            connection_quality: quality,
            ..session.clone()
        },
        Action::SetCallType { call_type } => CallSession {
            call_type: Some(call_type),
            ..session.clone()
        },
        Action::UpdateDuration { duration } => CallSession {
            duration,
            ..session.clone()
        },
    }
}
