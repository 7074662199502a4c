//! Help popup overlay listing the call console shortcuts.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const POPUP_WIDTH: u16 = 48;

struct Shortcut {
    key: &'static str,
    desc: &'static str,
}

const SHORTCUTS: &[(&str, &[Shortcut])] = &[
    (
        "CALL",
        &[
            Shortcut { key: "v / a / s", desc: "Start video / voice / screen share" },
            Shortcut { key: "c", desc: "Connection established" },
            Shortcut { key: "t", desc: "Cycle call type" },
            Shortcut { key: "e", desc: "End call" },
            Shortcut { key: "x", desc: "Fail call" },
        ],
    ),
    (
        "NETWORK",
        &[
            Shortcut { key: "l", desc: "Drop connection" },
            Shortcut { key: "r", desc: "Failed reconnection attempt" },
            Shortcut { key: "k", desc: "Reconnected" },
            Shortcut { key: "1-4", desc: "Quality: excellent .. poor" },
        ],
    ),
    (
        "ROOM",
        &[
            Shortcut { key: "p", desc: "Add participant" },
            Shortcut { key: "P", desc: "Remove last participant" },
        ],
    ),
    (
        "MISC",
        &[
            Shortcut { key: "d", desc: "Toggle log pane" },
            Shortcut { key: "PgUp/PgDn", desc: "Scroll log" },
            Shortcut { key: "?", desc: "Toggle help" },
            Shortcut { key: "q / Esc", desc: "Quit" },
        ],
    ),
];

fn help_lines() -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (idx, (title, shortcuts)) in SHORTCUTS.iter().enumerate() {
        if idx > 0 {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(
            *title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )));
        for sc in shortcuts.iter() {
            lines.push(Line::from(vec![
                Span::styled(format!("{:<12}", sc.key), Style::default().fg(Color::Yellow)),
                Span::styled(sc.desc, Style::default().fg(Color::Gray)),
            ]));
        }
    }
    lines
}

/// Render the help popup centered over the frame.
pub fn render_help_popup(frame: &mut Frame) {
    let lines = help_lines();
    let height = lines.len() as u16 + 2;
    let area = frame.area();
    let width = POPUP_WIDTH.min(area.width);
    let height = height.min(area.height);
    let popup = Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    );

    frame.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            " Shortcuts ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));
    frame.render_widget(Paragraph::new(lines).block(block), popup);
}
