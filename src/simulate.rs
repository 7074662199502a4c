//! Headless call scenario: drives a controller the way a transport layer
//! would and prints every snapshot change.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::{self, Instant};

use crate::calling::{
    CallController, CallError, CallPolicy, CallSession, CallState, CallType, ConnectionQuality,
    Participant,
};
use crate::tui::indicator;

/// Pause between failed reconnection attempts.
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Knobs for one simulated call.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub call_type: CallType,
    pub room_id: String,
    pub is_host: bool,
    /// Time spent Connecting before media flows
    pub setup: Duration,
    /// Time spent Connected before (and after) a connection drop
    pub connected: Duration,
    /// Failed reconnection attempts after the drop (0 = no drop)
    pub drops: u32,
    /// Emit JSON lines instead of indicator text
    pub json: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            call_type: CallType::Video,
            room_id: format!("room-{}", uuid::Uuid::new_v4().simple()),
            is_host: false,
            setup: Duration::from_millis(300),
            connected: Duration::from_secs(3),
            drops: 0,
            json: false,
        }
    }
}

/// Run the scenario to completion and return the final snapshot.
pub async fn run(policy: CallPolicy, scenario: Scenario) -> Result<CallSession> {
    let controller = CallController::new(policy);
    let printer = tokio::spawn(print_updates(controller.subscribe(), scenario.json));

    let final_session = drive(&controller, &scenario).await;
    tracing::info!(
        "Scenario finished in state {} after {}",
        final_session.state,
        final_session.formatted_duration()
    );

    // Dropping the controller closes the channel and stops the printer.
    drop(controller);
    printer.await.context("Snapshot printer task failed")??;

    Ok(final_session)
}

async fn drive(c: &CallController, scenario: &Scenario) -> CallSession {
    c.start_call(scenario.call_type, scenario.room_id.clone(), scenario.is_host);
    time::sleep(scenario.setup).await;

    let mut participants = vec![Participant::new("self", "You")];
    c.connection_established(participants.clone(), None);

    time::sleep(scenario.connected / 2).await;
    participants.push(Participant::new(
        uuid::Uuid::new_v4().to_string(),
        "Remote guest",
    ));
    c.update_participants(participants);
    time::sleep(scenario.connected / 2).await;

    if scenario.drops > 0 {
        c.update_connection_quality(ConnectionQuality::Fair);
        c.connection_lost(Some(CallError::with_code(
            "NETWORK_LOST",
            "Network connection lost",
        )));

        for attempt in 1..=scenario.drops {
            time::sleep(RECONNECT_BACKOFF).await;
            if !c.snapshot().can_reconnect() {
                // Out of budget: this failure takes the call to Failed.
                c.record_failed_reconnection(Some(CallError::new(
                    "Reconnection attempts exhausted",
                )));
                return c.snapshot();
            }
            tracing::debug!("Reconnection attempt {} failed", attempt);
            c.record_failed_reconnection(Some(CallError::new(format!(
                "Reconnection attempt {} failed",
                attempt
            ))));
            if c.snapshot().state == CallState::Failed {
                return c.snapshot();
            }
        }

        time::sleep(RECONNECT_BACKOFF).await;
        c.attempt_reconnection();
        c.reconnection_success();
        time::sleep(scenario.connected).await;
    }

    c.end_call_and_wait().await
}

async fn print_updates(mut rx: watch::Receiver<CallSession>, json: bool) -> Result<()> {
    let started = Instant::now();
    loop {
        let session = rx.borrow_and_update().clone();
        if json {
            let line = serde_json::json!({
                "elapsedMs": started.elapsed().as_millis() as u64,
                "session": session,
                "flags": session.flags(),
            });
            println!(
                "{}",
                serde_json::to_string(&line).context("Failed to serialize snapshot")?
            );
        } else {
            println!(
                "{:>6.1}s  {}",
                started.elapsed().as_secs_f64(),
                indicator::status_line(&session)
            );
        }

        if rx.changed().await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(drops: u32) -> Scenario {
        Scenario {
            room_id: "room-test".to_string(),
            setup: Duration::from_millis(100),
            connected: Duration::from_secs(2),
            drops,
            ..Scenario::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_call_ends() {
        let session = run(CallPolicy::default(), quick(0)).await.unwrap();
        assert_eq!(session.state, CallState::Ended);
        assert!(session.duration >= 1, "duration {}", session.duration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_drop_ends_normally() {
        let session = run(CallPolicy::default(), quick(2)).await.unwrap();
        assert_eq!(session.state, CallState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reconnects_fail() {
        let session = run(CallPolicy::default(), quick(5)).await.unwrap();
        assert_eq!(session.state, CallState::Failed);
        assert!(session.has_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_fails() {
        let policy = CallPolicy {
            max_reconnection_attempts: 0,
            ..CallPolicy::default()
        };
        let session = run(policy, quick(3)).await.unwrap();
        assert_eq!(session.state, CallState::Failed);
        assert_eq!(
            session.error.map(|e| e.message).as_deref(),
            Some("Reconnection attempts exhausted")
        );
    }
}
