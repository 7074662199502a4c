//! Debug log pane: shows captured tracing output under the call panel.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};

use super::log_capture::LogBuffer;

/// Scrollback kept in the pane.
const MAX_LINES: usize = 1000;

pub struct DebugLogState {
    source: LogBuffer,
    lines: Vec<String>,
    pub visible: bool,
    /// Lines scrolled back from the newest (0 = follow the tail).
    scroll_back: usize,
}

impl DebugLogState {
    pub fn new(source: LogBuffer) -> Self {
        Self {
            source,
            lines: Vec::new(),
            visible: false,
            scroll_back: 0,
        }
    }

    /// Pull newly captured lines. Call once per loop iteration.
    pub fn refresh(&mut self) {
        self.lines.extend(self.source.drain());
        if self.lines.len() > MAX_LINES {
            let excess = self.lines.len() - MAX_LINES;
            self.lines.drain(..excess);
            self.scroll_back = self.scroll_back.min(self.lines.len().saturating_sub(1));
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        if self.visible {
            self.scroll_back = 0;
        }
    }

    pub fn scroll_up(&mut self, n: usize) {
        let limit = self.lines.len().saturating_sub(1);
        self.scroll_back = (self.scroll_back + n).min(limit);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(n);
    }

    /// Window of lines ending `scroll_back` lines before the newest.
    fn window(&self, height: usize) -> &[String] {
        let end = self.lines.len().saturating_sub(self.scroll_back);
        let start = end.saturating_sub(height);
        &self.lines[start..end]
    }
}

pub fn render(area: Rect, buf: &mut Buffer, state: &DebugLogState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Log ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let lines: Vec<Line> = state
        .window(inner.height as usize)
        .iter()
        .map(|l| Line::from(Span::styled(l.clone(), Style::default().fg(level_color(l)))))
        .collect();

    Paragraph::new(lines).render(inner, buf);
}

/// Color by the level column of the fmt layer output: the token after the
/// timestamp. Message text is never inspected.
fn level_color(line: &str) -> Color {
    match line.split_whitespace().nth(1) {
        Some("ERROR") => Color::Red,
        Some("WARN") => Color::Yellow,
        Some("INFO") => Color::Green,
        Some("DEBUG") | Some("TRACE") => Color::DarkGray,
        _ => Color::White,
    }
}
