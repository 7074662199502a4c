//! Call status indicator: projects a session snapshot onto an icon, label,
//! description and color, plus a reconnection progress gauge.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Gauge, Paragraph, Widget},
};

use crate::calling::{CallSession, CallState};

/// What to show for one session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub icon: &'static str,
    pub label: &'static str,
    pub description: String,
    pub color: Color,
}

impl Indicator {
    /// `None` while idle: there is no call to show.
    pub fn for_session(session: &CallSession) -> Option<Self> {
        let indicator = match session.state {
            CallState::Idle => return None,
            CallState::Connecting => Indicator {
                icon: "~",
                label: "Connecting...",
                description: match session.room_id {
                    Some(ref room) => format!("Joining room {}", room),
                    None => "Setting up call".to_string(),
                },
                color: Color::Yellow,
            },
            CallState::Connected => {
                let mut description = match session.call_type {
                    Some(kind) => format!("{} call, {}", kind.label(), session.formatted_duration()),
                    None => session.formatted_duration(),
                };
                match session.participants.len() {
                    0 => {}
                    1 => description.push_str(", 1 participant"),
                    n => description.push_str(&format!(", {} participants", n)),
                }
                Indicator {
                    icon: "*",
                    label: "Connected",
                    description,
                    color: Color::Green,
                }
            }
            CallState::Reconnecting => {
                let mut description = format!(
                    "Attempt {} of {}",
                    session.reconnection_attempts, session.max_reconnection_attempts
                );
                if let Some(ref err) = session.error {
                    description.push_str(&format!(" ({})", err));
                }
                Indicator {
                    icon: "!",
                    label: "Reconnecting...",
                    description,
                    color: Color::Yellow,
                }
            }
            CallState::Disconnecting => Indicator {
                icon: "-",
                label: "Ending call...",
                description: "Hanging up".to_string(),
                color: Color::Gray,
            },
            CallState::Failed => Indicator {
                icon: "x",
                label: "Call failed",
                description: session
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unable to connect".to_string()),
                color: Color::Red,
            },
            CallState::Ended => Indicator {
                icon: "o",
                label: "Call ended",
                description: format!("Duration {}", session.formatted_duration()),
                color: Color::Gray,
            },
        };
        Some(indicator)
    }
}

/// One-line plain text form, for non-TUI output.
pub fn status_line(session: &CallSession) -> String {
    match Indicator::for_session(session) {
        Some(ind) => format!("[{}] {} {}", ind.icon, ind.label, ind.description),
        None => "[ ] No active call".to_string(),
    }
}

/// Render the indicator panel.
pub fn render(area: Rect, buf: &mut Buffer, session: &CallSession) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Call ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let Some(ind) = Indicator::for_session(session) else {
        Paragraph::new(Line::from(Span::styled(
            "No active call. Press v, a or s to start one.",
            Style::default().fg(Color::DarkGray),
        )))
        .render(inner, buf);
        return;
    };

    let [status_area, desc_area, gauge_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(inner);

    let status = Line::from(vec![
        Span::styled(
            format!(" {} ", ind.icon),
            Style::default().fg(ind.color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            ind.label,
            Style::default().fg(ind.color).add_modifier(Modifier::BOLD),
        ),
    ]);
    Paragraph::new(status).render(status_area, buf);

    Paragraph::new(Line::from(Span::styled(
        format!("   {}", ind.description),
        Style::default().fg(Color::White),
    )))
    .render(desc_area, buf);

    if session.should_show_reconnecting() {
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Yellow).bg(Color::DarkGray))
            .ratio(session.reconnection_progress())
            .label(format!(
                "{}/{}",
                session.reconnection_attempts, session.max_reconnection_attempts
            ))
            .render(gauge_area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::{CallError, CallType, Participant};

    fn session(state: CallState) -> CallSession {
        CallSession {
            state,
            ..CallSession::default()
        }
    }

    fn buffer_text(buf: &Buffer) -> String {
        let area = buf.area;
        let mut out = String::new();
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_idle_has_no_indicator() {
        assert!(Indicator::for_session(&session(CallState::Idle)).is_none());
        assert_eq!(status_line(&session(CallState::Idle)), "[ ] No active call");
    }

    #[test]
    fn test_connected_description() {
        let mut s = session(CallState::Connected);
        s.call_type = Some(CallType::Video);
        s.duration = 65;
        s.participants = vec![Participant::new("a", "A"), Participant::new("b", "B")];
        let ind = Indicator::for_session(&s).unwrap();
        assert_eq!(ind.label, "Connected");
        assert_eq!(ind.description, "Video call, 1:05, 2 participants");
        assert_eq!(ind.color, Color::Green);
    }

    #[test]
    fn test_reconnecting_shows_attempts_and_error() {
        let mut s = session(CallState::Reconnecting);
        s.reconnection_attempts = 2;
        s.error = Some(CallError::new("network down"));
        let ind = Indicator::for_session(&s).unwrap();
        assert_eq!(ind.description, "Attempt 2 of 5 (network down)");
    }

    #[test]
    fn test_failed_uses_error_message() {
        let mut s = session(CallState::Failed);
        assert_eq!(
            Indicator::for_session(&s).unwrap().description,
            "Unable to connect"
        );
        s.error = Some(CallError::new("media failure"));
        let ind = Indicator::for_session(&s).unwrap();
        assert_eq!(ind.description, "media failure");
        assert_eq!(ind.color, Color::Red);
    }

    #[test]
    fn test_every_non_idle_state_has_indicator() {
        for state in CallState::ALL {
            let ind = Indicator::for_session(&session(state));
            assert_eq!(ind.is_some(), state != CallState::Idle, "{}", state);
        }
    }

    #[test]
    fn test_render_reconnecting_gauge() {
        let mut s = session(CallState::Reconnecting);
        s.reconnection_attempts = 3;
        let area = Rect::new(0, 0, 40, 5);
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &s);

        let text = buffer_text(&buf);
        assert!(text.contains("Reconnecting..."), "{}", text);
        assert!(text.contains("Attempt 3 of 5"), "{}", text);
        assert!(text.contains("3/5"), "{}", text);
    }

    #[test]
    fn test_render_connected_has_no_gauge() {
        let mut s = session(CallState::Connected);
        s.duration = 5;
        let area = Rect::new(0, 0, 40, 5);
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &s);

        let text = buffer_text(&buf);
        assert!(text.contains("Connected"), "{}", text);
        assert!(!text.contains("/5"), "{}", text);
    }

    #[test]
    fn test_render_tiny_area_does_not_panic() {
        let area = Rect::new(0, 0, 2, 2);
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &session(CallState::Connected));
    }
}
