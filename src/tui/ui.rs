//! UI rendering for the call console

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};

use super::app::App;
use super::debug_log;
use super::help;
use super::indicator::{self, Indicator};
use crate::calling::{CallSession, ConnectionQuality};

/// Indicator panel height: border + status + description + gauge
const INDICATOR_HEIGHT: u16 = 5;

fn quality_color(quality: ConnectionQuality) -> Color {
    match quality {
        ConnectionQuality::Excellent | ConnectionQuality::Good => Color::Green,
        ConnectionQuality::Fair => Color::Yellow,
        ConnectionQuality::Poor => Color::Red,
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), &app.session);

    // Log pane takes the lower half when visible.
    let (call_area, log_area) = if app.debug_log.visible {
        let [top, bottom] =
            Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)])
                .areas(main_area);
        (top, Some(bottom))
    } else {
        (main_area, None)
    };

    let [indicator_area, details_area] = Layout::vertical([
        Constraint::Length(INDICATOR_HEIGHT),
        Constraint::Fill(1),
    ])
    .areas(call_area);

    indicator::render(indicator_area, frame.buffer_mut(), &app.session);
    render_details(details_area, frame.buffer_mut(), &app.session);

    if let Some(log_area) = log_area {
        debug_log::render(log_area, frame.buffer_mut(), &app.debug_log);
    }

    render_status(status_area, frame.buffer_mut(), &app.session);

    if app.show_help {
        help::render_help_popup(frame);
    }
}

/// Header: title on the left, compact call state on the right
fn render_header(area: Rect, buf: &mut Buffer, session: &CallSession) {
    let title = " CRYB Calls";
    let (symbol, color) = match Indicator::for_session(session) {
        Some(ind) => (ind.icon, ind.color),
        None => (" ", Color::Gray),
    };
    let right = format!(" {} {}  [?] Help ", symbol, session.state);
    let padding = area
        .width
        .saturating_sub((title.len() + right.len()) as u16) as usize;

    let line = Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(right, Style::default().fg(color)),
    ]);

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Session fields and the participant list
fn render_details(area: Rect, buf: &mut Buffer, session: &CallSession) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Session ");
    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let label = Style::default().fg(Color::Gray);
    let value = Style::default().fg(Color::White);
    let field = |name: &'static str, v: String, style: Style| {
        Line::from(vec![
            Span::styled(format!("{:<14}", name), label),
            Span::styled(v, style),
        ])
    };

    let mut lines = vec![
        field(
            "Room",
            session.room_id.clone().unwrap_or_else(|| "-".to_string()),
            value,
        ),
        field(
            "Type",
            session
                .call_type
                .map(|t| t.label().to_string())
                .unwrap_or_else(|| "-".to_string()),
            value,
        ),
        field("Host", if session.is_host { "yes" } else { "no" }.to_string(), value),
        field("Duration", session.formatted_duration(), value),
        field(
            "Quality",
            session.connection_quality.as_str().to_string(),
            Style::default().fg(quality_color(session.connection_quality)),
        ),
        field(
            "Reconnects",
            format!(
                "{}/{}{}",
                session.reconnection_attempts,
                session.max_reconnection_attempts,
                if session.can_reconnect() { "" } else { " (exhausted)" }
            ),
            value,
        ),
    ];

    if let Some(ref err) = session.error {
        lines.push(field("Error", err.to_string(), Style::default().fg(Color::Red)));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("Participants ({})", session.participants.len()),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for p in &session.participants {
        let name = p.display_name.as_deref().unwrap_or(&p.id);
        lines.push(Line::from(Span::styled(format!("  {}", name), value)));
    }

    Paragraph::new(lines).render(inner, buf);
}

/// Status bar: derived flags and key hints
fn render_status(area: Rect, buf: &mut Buffer, session: &CallSession) {
    let sep = Span::styled(" | ", Style::default().fg(Color::DarkGray));
    let flag = |name: &'static str, on: bool| {
        Span::styled(
            name,
            if on {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::DarkGray)
            },
        )
    };

    let line = Line::from(vec![
        Span::raw(" "),
        flag("active", session.is_active()),
        sep.clone(),
        flag("error", session.has_error()),
        sep.clone(),
        flag("can-reconnect", session.can_reconnect()),
        sep,
        Span::styled("v/a/s start  c connect  e end  q quit", Style::default().fg(Color::Gray)),
    ]);

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
