//! Call console state and main event loop

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use ratatui::DefaultTerminal;
use tokio_stream::wrappers::WatchStream;

use super::debug_log::DebugLogState;
use super::log_capture::LogBuffer;
use super::ui;
use crate::calling::{
    CallController, CallError, CallSession, CallType, ConnectionQuality, Participant,
};

/// Redraw cadence when nothing else happens (keeps the log pane fresh)
const FRAME_DURATION_MS: u64 = 250;

/// Room used for calls started from the keyboard
const CONSOLE_ROOM: &str = "console-room";

/// Application state
pub struct App {
    pub controller: CallController,
    /// Latest snapshot, what the UI draws
    pub session: CallSession,
    pub debug_log: DebugLogState,
    pub show_help: bool,
    pub should_exit: bool,
    /// Counter for generated participant names
    guests: u32,
}

impl App {
    pub fn new(controller: CallController, logs: LogBuffer) -> Self {
        let session = controller.snapshot();
        Self {
            controller,
            session,
            debug_log: DebugLogState::new(logs),
            show_help: false,
            should_exit: false,
            guests: 0,
        }
    }

    /// Map a key press onto a controller operation
    pub fn handle_key(&mut self, key: KeyEvent) {
        let c = &self.controller;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_exit = true,
            KeyCode::Char('?') => self.show_help = !self.show_help,
            KeyCode::Char('d') => self.debug_log.toggle(),
            KeyCode::PageUp => self.debug_log.scroll_up(5),
            KeyCode::PageDown => self.debug_log.scroll_down(5),

            KeyCode::Char('v') => c.start_call(CallType::Video, CONSOLE_ROOM, true),
            KeyCode::Char('a') => c.start_call(CallType::Voice, CONSOLE_ROOM, true),
            KeyCode::Char('s') => c.start_call(CallType::ScreenShare, CONSOLE_ROOM, true),
            KeyCode::Char('c') => {
                c.connection_established(self.session.participants.clone(), None)
            }
            KeyCode::Char('l') => c.connection_lost(Some(CallError::with_code(
                "NETWORK_LOST",
                "Network connection lost",
            ))),
            KeyCode::Char('r') => c.record_failed_reconnection(Some(CallError::new(
                "Reconnection attempt failed",
            ))),
            KeyCode::Char('k') => c.reconnection_success(),
            KeyCode::Char('t') => {
                let next = match self.session.call_type {
                    Some(CallType::Voice) => CallType::Video,
                    Some(CallType::Video) => CallType::ScreenShare,
                    Some(CallType::ScreenShare) | None => CallType::Voice,
                };
                c.set_call_type(next);
            }
            KeyCode::Char('e') => c.end_call(),
            KeyCode::Char('x') => c.call_failed(Some(CallError::with_code(
                "MEDIA_FAILURE",
                "Media transport failed",
            ))),

            KeyCode::Char('p') => {
                self.guests += 1;
                let mut participants = self.session.participants.clone();
                participants.push(Participant::new(
                    uuid::Uuid::new_v4().to_string(),
                    format!("Guest {}", self.guests),
                ));
                c.update_participants(participants);
            }
            KeyCode::Char('P') => {
                let mut participants = self.session.participants.clone();
                if participants.pop().is_some() {
                    c.update_participants(participants);
                }
            }
            KeyCode::Char(digit @ '1'..='4') => {
                let quality = match digit {
                    '1' => ConnectionQuality::Excellent,
                    '2' => ConnectionQuality::Good,
                    '3' => ConnectionQuality::Fair,
                    _ => ConnectionQuality::Poor,
                };
                c.update_connection_quality(quality);
            }
            _ => {}
        }
        self.session = self.controller.snapshot();
    }
}

/// Run the call console with panic-safe terminal restore
pub async fn run(controller: CallController, logs: LogBuffer) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = AssertUnwindSafe(run_app(&mut terminal, controller, logs))
        .catch_unwind()
        .await;
    ratatui::restore();

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    controller: CallController,
    logs: LogBuffer,
) -> Result<()> {
    let mut app = App::new(controller, logs);
    let mut events = EventStream::new();
    let mut updates = WatchStream::new(app.controller.subscribe());
    let mut frame_tick = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));

    while !app.should_exit {
        app.debug_log.refresh();
        terminal
            .draw(|frame| ui::render(frame, &app))
            .context("Failed to draw frame")?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    app.handle_key(key);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("Terminal event stream failed"),
                None => break,
            },
            Some(session) = updates.next() => {
                app.session = session;
            }
            _ = frame_tick.tick() => {}
        }
    }

    tracing::info!("Call console closed");
    Ok(())
}
