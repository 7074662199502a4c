//! Call lifecycle: session state, transitions, derived status and the
//! controller that owns one session and its timers.
//!
//! This handles call state only (no media or signaling).

pub mod session;
pub mod state;
pub mod status;
pub mod types;

pub use session::{CallController, CallPolicy};
pub use state::CallSession;
pub use types::{CallError, CallState, CallType, ConnectionQuality, Participant};
