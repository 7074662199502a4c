//! Call session controller: the dispatch facade plus the two scheduled side
//! effects (duration ticker, delayed end-of-call).
//!
//! The controller owns the session inside a `watch` channel so any number of
//! presentation consumers can subscribe to snapshots. Timer tasks only hold a
//! weak reference to the internals; dropping the controller aborts them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::state::{self, Action, CallSession, DEFAULT_MAX_RECONNECTION_ATTEMPTS};
use super::types::{CallError, CallState, CallType, ConnectionQuality, Participant};

/// Grace period between `end_call` and the terminal `Ended` state.
pub const DEFAULT_END_CALL_DELAY: Duration = Duration::from_millis(1000);

/// Duration ticker period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// Tunables for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub max_reconnection_attempts: u32,
    pub end_call_delay: Duration,
    pub tick_interval: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            max_reconnection_attempts: DEFAULT_MAX_RECONNECTION_ATTEMPTS,
            end_call_delay: DEFAULT_END_CALL_DELAY,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Wall clock anchored to the Tokio timer.
///
/// `now()` advances with `tokio::time::Instant`, which tracks real time in
/// production and virtual time when the runtime clock is paused.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    wall: DateTime<Utc>,
    anchor: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            wall: Utc::now(),
            anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }

    /// Whole seconds since `start`, never negative.
    pub fn elapsed_secs(&self, start: DateTime<Utc>) -> u64 {
        let millis = (self.now() - start).num_milliseconds().max(0);
        (millis / 1000) as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// The running duration ticker and the start time it measures from.
struct Ticker {
    start_time: DateTime<Utc>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
    ticker: Option<Ticker>,
    pending_end: Option<JoinHandle<()>>,
}

impl Timers {
    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.handle.abort();
        }
    }

    fn cancel_pending_end(&mut self) {
        if let Some(handle) = self.pending_end.take() {
            handle.abort();
        }
    }
}

struct Inner {
    store: watch::Sender<CallSession>,
    timers: Mutex<Timers>,
    /// Bumped on every `StartConnecting`. A delayed `CallEnded` only lands if
    /// the epoch it was scheduled in is still current.
    epoch: AtomicU64,
    policy: CallPolicy,
    clock: SessionClock,
}

impl Inner {
    fn lock_timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reduce `actions` in order under one lock, if `guard` accepts the current
    /// snapshot. Returns the epoch the actions landed in, or `None` if the
    /// guard refused them.
    fn apply<G>(self: &Arc<Self>, actions: Vec<Action>, guard: G) -> Option<u64>
    where
        G: FnOnce(&CallSession) -> bool,
    {
        let mut transition = None;
        let mut landed_in = None;

        let applied = self.store.send_if_modified(|session| {
            if !guard(session) {
                return false;
            }
            let before = session.state;
            for action in actions {
                tracing::debug!("Call action {}", action.name());
                if matches!(action, Action::StartConnecting { .. }) {
                    self.epoch.fetch_add(1, Ordering::SeqCst);
                }
                *session = state::reduce(session, action);
            }
            landed_in = Some(self.epoch.load(Ordering::SeqCst));
            if session.state != before {
                transition = Some((before, session.state, session.error.clone()));
            }
            true
        });

        if let Some((from, to, error)) = transition {
            tracing::info!("Call state: {} -> {}", from, to);
            if to == CallState::Failed {
                match error {
                    Some(e) => tracing::warn!("Call failed: {}", e),
                    None => tracing::warn!("Call failed"),
                }
            }
        }

        if applied {
            self.reconcile_ticker();
        }
        landed_in
    }

    fn dispatch(self: &Arc<Self>, action: Action) -> Option<u64> {
        self.apply(vec![action], |_| true)
    }

    /// Keep exactly one ticker alive while Connected with a start time, and
    /// none otherwise.
    fn reconcile_ticker(self: &Arc<Self>) {
        let mut timers = self.lock_timers();
        let wanted = {
            let session = self.store.borrow();
            match (session.state, session.start_time) {
                (CallState::Connected, Some(start)) => Some(start),
                _ => None,
            }
        };

        match wanted {
            Some(start) => {
                let running = timers
                    .ticker
                    .as_ref()
                    .is_some_and(|t| t.start_time == start && !t.handle.is_finished());
                if !running {
                    timers.stop_ticker();
                    tracing::debug!("Starting duration ticker (start={})", start);
                    timers.ticker = Some(Ticker {
                        start_time: start,
                        handle: self.spawn_ticker(start),
                    });
                }
            }
            None => {
                if timers.ticker.is_some() {
                    tracing::debug!("Stopping duration ticker");
                }
                timers.stop_ticker();
            }
        }
    }

    fn spawn_ticker(self: &Arc<Self>, start: DateTime<Utc>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.policy.tick_interval;

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await; // skip first immediate tick

            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let duration = inner.clock.elapsed_secs(start);
                // A tick racing a state change must not touch the new state.
                inner.apply(vec![Action::UpdateDuration { duration }], |s| {
                    s.state == CallState::Connected && s.start_time == Some(start)
                });
            }
        })
    }

    /// Apply `CallEnded` after the policy delay, unless a call started after
    /// `epoch` in the meantime.
    fn schedule_end(self: &Arc<Self>, epoch: u64) {
        let weak = Arc::downgrade(self);
        let delay = self.policy.end_call_delay;

        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let landed = inner.apply(vec![Action::CallEnded], |_| {
                inner.epoch.load(Ordering::SeqCst) == epoch
            });
            if landed.is_none() {
                tracing::debug!("Dropped stale end-of-call from an earlier session");
            }
        });

        let mut timers = self.lock_timers();
        timers.cancel_pending_end();
        timers.pending_end = Some(handle);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(|e| e.into_inner());
        timers.stop_ticker();
        timers.cancel_pending_end();
    }
}

/// Owner of one call session. Create it where the call UI is wired up and
/// hand `subscribe()` receivers to whatever renders it.
///
/// Must be created and driven inside a Tokio runtime.
pub struct CallController {
    inner: Arc<Inner>,
}

impl CallController {
    pub fn new(policy: CallPolicy) -> Self {
        let (store, _) = watch::channel(CallSession::new(policy.max_reconnection_attempts));
        Self {
            inner: Arc::new(Inner {
                store,
                timers: Mutex::new(Timers::default()),
                epoch: AtomicU64::new(0),
                policy,
                clock: SessionClock::new(),
            }),
        }
    }

    pub fn clock(&self) -> SessionClock {
        self.inner.clock
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> CallSession {
        self.inner.store.borrow().clone()
    }

    /// Receiver that observes every snapshot from now on.
    pub fn subscribe(&self) -> watch::Receiver<CallSession> {
        self.inner.store.subscribe()
    }

    // -----------------------------------------------------------------------
    // Dispatch facade
    // -----------------------------------------------------------------------

    /// Begin a new call. Cancels any end-of-call still pending from the
    /// previous one.
    pub fn start_call(&self, call_type: CallType, room_id: impl Into<String>, is_host: bool) {
        let room_id = room_id.into();
        tracing::info!("Starting {} call in room {}", call_type.label(), room_id);
        self.inner.dispatch(Action::StartConnecting {
            call_type,
            room_id,
            is_host,
        });
        self.inner.lock_timers().cancel_pending_end();
    }

    /// Media is flowing. `start_time` defaults to now.
    pub fn connection_established(
        &self,
        participants: Vec<Participant>,
        start_time: Option<DateTime<Utc>>,
    ) {
        let start_time = start_time.unwrap_or_else(|| self.inner.clock.now());
        self.inner.dispatch(Action::ConnectionEstablished {
            participants,
            start_time,
        });
    }

    pub fn connection_lost(&self, error: Option<CallError>) {
        self.inner.dispatch(Action::ConnectionLost { error });
    }

    pub fn attempt_reconnection(&self) {
        self.inner.dispatch(Action::ReconnectionAttempt);
    }

    pub fn reconnection_success(&self) {
        self.inner.dispatch(Action::ReconnectionSuccess);
    }

    /// Record a failed reconnection. Pair with `attempt_reconnection` first,
    /// or use `record_failed_reconnection` to do both at once.
    pub fn reconnection_failed(&self, error: Option<CallError>) {
        self.inner.dispatch(Action::ReconnectionFailed { error });
    }

    /// Count an attempt and record its failure as one atomic step.
    pub fn record_failed_reconnection(&self, error: Option<CallError>) {
        self.inner.apply(
            vec![
                Action::ReconnectionAttempt,
                Action::ReconnectionFailed { error },
            ],
            |_| true,
        );
    }

    /// Two-phase hang-up: Disconnecting now, Ended after the policy delay.
    pub fn end_call(&self) {
        // The epoch is read under the same store lock as the transition, so a
        // concurrent `start_call` can never hand its epoch to this hang-up.
        if let Some(epoch) = self.inner.dispatch(Action::StartDisconnecting) {
            self.inner.schedule_end(epoch);
        }
    }

    /// `end_call`, then wait until the disconnecting window closes. Resolves
    /// with the Ended snapshot, or with a newer call's snapshot if one was
    /// started in the meantime.
    pub async fn end_call_and_wait(&self) -> CallSession {
        self.end_call();
        self.wait_for_state(|s| s.state != CallState::Disconnecting)
            .await
    }

    pub fn call_failed(&self, error: Option<CallError>) {
        self.inner.dispatch(Action::CallFailed { error });
    }

    pub fn update_participants(&self, participants: Vec<Participant>) {
        self.inner.dispatch(Action::UpdateParticipants { participants });
    }

    pub fn update_connection_quality(&self, quality: ConnectionQuality) {
        self.inner.dispatch(Action::UpdateQuality { quality });
    }

    pub fn set_call_type(&self, call_type: CallType) {
        self.inner.dispatch(Action::SetCallType { call_type });
    }

    /// Wait until a snapshot satisfies `pred` (checked against the current
    /// snapshot first).
    pub async fn wait_for_state<F>(&self, mut pred: F) -> CallSession
    where
        F: FnMut(&CallSession) -> bool,
    {
        let mut rx = self.inner.store.subscribe();
        let result = rx.wait_for(|s| pred(s)).await.map(|s| s.clone());
        // The sender lives as long as `self`, so the channel cannot close here.
        result.unwrap_or_else(|_| self.snapshot())
    }
}

impl Default for CallController {
    fn default() -> Self {
        Self::new(CallPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_for(c: &CallController, secs: i64) {
        c.start_call(CallType::Video, "room-1", true);
        let start = c.clock().now() - chrono::Duration::seconds(secs);
        c.connection_established(vec![Participant::new("u1", "Ada")], Some(start));
    }

    #[tokio::test]
    async fn test_start_call_clears_residue() {
        let c = CallController::default();
        connected_for(&c, 0);
        c.connection_lost(Some(CallError::new("lost")));
        c.attempt_reconnection();
        c.attempt_reconnection();

        c.start_call(CallType::Voice, "room-2", false);
        let s = c.snapshot();
        assert_eq!(s.state, CallState::Connecting);
        assert_eq!(s.reconnection_attempts, 0);
        assert!(s.error.is_none());
        assert_eq!(s.room_id.as_deref(), Some("room-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_established_defaults_start_time_to_now() {
        let c = CallController::default();
        c.start_call(CallType::Voice, "room-1", false);
        c.connection_established(Vec::new(), None);
        let s = c.snapshot();
        assert_eq!(s.state, CallState::Connected);
        assert!(s.participants.is_empty());
        let start = s.start_time.unwrap();
        assert!((c.clock().now() - start).num_milliseconds().abs() < 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_ticks_from_past_start() {
        let c = CallController::default();
        let mut rx = c.subscribe();
        connected_for(&c, 65);
        rx.borrow_and_update();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            rx.changed().await.unwrap();
            seen.push(rx.borrow_and_update().duration);
        }
        assert!(seen[0] >= 65, "durations: {:?}", seen);
        assert!(seen[1] > seen[0], "durations: {:?}", seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_while_reconnecting_and_resumes() {
        let c = CallController::default();
        connected_for(&c, 0);
        time::sleep(Duration::from_millis(2500)).await;
        let before_drop = c.snapshot().duration;
        assert_eq!(before_drop, 2);

        c.connection_lost(None);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(c.snapshot().duration, before_drop);

        c.attempt_reconnection();
        c.reconnection_success();
        time::sleep(Duration::from_millis(1500)).await;
        // Measured from the original start time, not from the reconnect.
        assert_eq!(c.snapshot().duration, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_call_is_two_phase() {
        let c = CallController::default();
        connected_for(&c, 10);
        time::sleep(Duration::from_millis(3500)).await;

        c.end_call();
        let disconnecting = c.snapshot();
        assert_eq!(disconnecting.state, CallState::Disconnecting);
        let duration_at_end = disconnecting.duration;
        assert!(duration_at_end >= 13);

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(c.snapshot().state, CallState::Disconnecting);

        time::sleep(Duration::from_millis(600)).await;
        let ended = c.snapshot();
        assert_eq!(ended.state, CallState::Ended);
        assert_eq!(ended.duration, duration_at_end);
        assert!(ended.participants.is_empty());
        assert!(ended.call_type.is_none());
        assert!(ended.room_id.is_none());
        assert!(!ended.is_host);
        assert!(ended.start_time.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_call_and_wait_resolves_after_delay() {
        let c = CallController::default();
        connected_for(&c, 0);

        let mut wait = tokio_test::task::spawn(c.end_call_and_wait());
        tokio_test::assert_pending!(wait.poll());

        time::sleep(Duration::from_millis(1100)).await;
        let ended = tokio_test::assert_ready!(wait.poll());
        assert_eq!(ended.state, CallState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_call_cancels_pending_end() {
        let c = CallController::default();
        connected_for(&c, 0);
        c.end_call();

        time::sleep(Duration::from_millis(400)).await;
        c.start_call(CallType::ScreenShare, "room-2", false);

        time::sleep(Duration::from_secs(3)).await;
        let s = c.snapshot();
        assert_eq!(s.state, CallState::Connecting);
        assert_eq!(s.room_id.as_deref(), Some("room-2"));
        assert_eq!(s.call_type, Some(CallType::ScreenShare));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_scheduled_across_new_call_is_dropped() {
        let c = CallController::default();
        connected_for(&c, 0);

        // Hang-up and a new call interleave between the two halves of end_call.
        let epoch = c.inner.dispatch(Action::StartDisconnecting).unwrap();
        c.start_call(CallType::Voice, "room-2", false);
        c.inner.schedule_end(epoch);

        time::sleep(Duration::from_secs(3)).await;
        let s = c.snapshot();
        assert_eq!(s.state, CallState::Connecting);
        assert_eq!(s.room_id.as_deref(), Some("room-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_end_call_restarts_grace_period() {
        let c = CallController::default();
        connected_for(&c, 0);

        c.end_call();
        time::sleep(Duration::from_millis(300)).await;
        c.end_call();

        // The first schedule would have fired at 1000ms.
        time::sleep(Duration::from_millis(800)).await;
        assert_eq!(c.snapshot().state, CallState::Disconnecting);

        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(c.snapshot().state, CallState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_failed_reconnections_fail_on_fifth() {
        let c = CallController::default();
        connected_for(&c, 0);
        c.connection_lost(Some(CallError::new("network down")));

        for attempt in 1..=5u32 {
            assert!(c.snapshot().can_reconnect());
            c.record_failed_reconnection(Some(CallError::new("retry failed")));
            let s = c.snapshot();
            if attempt < 5 {
                assert_eq!(s.state, CallState::Reconnecting);
                assert_eq!(s.reconnection_attempts, attempt);
            } else {
                assert_eq!(s.state, CallState::Failed);
                assert!(s.has_error());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_attempt_and_failure_calls() {
        let c = CallController::default();
        connected_for(&c, 0);
        c.connection_lost(None);
        for _ in 0..4 {
            c.attempt_reconnection();
            c.reconnection_failed(None);
        }
        assert_eq!(c.snapshot().state, CallState::Reconnecting);
        c.attempt_reconnection();
        assert!(!c.snapshot().can_reconnect());
        c.reconnection_failed(Some(CallError::new("gave up")));
        assert_eq!(c.snapshot().state, CallState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_on_failure() {
        let c = CallController::default();
        connected_for(&c, 0);
        time::sleep(Duration::from_millis(1500)).await;
        c.call_failed(Some(CallError::new("media failure")));
        time::sleep(Duration::from_secs(3)).await;
        let s = c.snapshot();
        assert_eq!(s.state, CallState::Failed);
        assert_eq!(s.duration, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timers() {
        let c = CallController::default();
        let rx = c.subscribe();
        connected_for(&c, 0);
        c.end_call();
        drop(c);

        time::sleep(Duration::from_secs(5)).await;
        let last = rx.borrow();
        assert_eq!(last.state, CallState::Disconnecting);
        assert_eq!(last.duration, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy() {
        let c = CallController::new(CallPolicy {
            max_reconnection_attempts: 2,
            end_call_delay: Duration::from_millis(200),
            tick_interval: Duration::from_millis(500),
        });
        connected_for(&c, 0);
        c.connection_lost(None);
        c.record_failed_reconnection(None);
        assert_eq!(c.snapshot().state, CallState::Reconnecting);
        c.record_failed_reconnection(None);
        assert_eq!(c.snapshot().state, CallState::Failed);

        connected_for(&c, 0);
        c.end_call();
        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(c.snapshot().state, CallState::Ended);
    }

    #[tokio::test]
    async fn test_updates_reach_subscribers() {
        let c = CallController::default();
        let mut rx = c.subscribe();
        connected_for(&c, 0);
        c.update_participants(vec![
            Participant::new("u1", "Ada"),
            Participant::new("u2", "Linus"),
        ]);
        c.update_connection_quality(ConnectionQuality::Fair);
        c.set_call_type(CallType::Voice);

        assert!(rx.has_changed().unwrap());
        let s = rx.borrow_and_update().clone();
        assert_eq!(s.participants.len(), 2);
        assert_eq!(s.connection_quality, ConnectionQuality::Fair);
        assert_eq!(s.call_type, Some(CallType::Voice));
    }

    #[test]
    fn test_clock_elapsed_never_negative() {
        let clock = SessionClock::new();
        let future = clock.now() + chrono::Duration::seconds(30);
        assert_eq!(clock.elapsed_secs(future), 0);
    }
}
