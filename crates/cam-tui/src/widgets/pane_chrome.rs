//! PaneChrome — bordered pane with focus styling and a status badge.

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders},
};

use crate::theme::{style_focused_border, style_unfocused_border, C_KEY_HINT, C_MUTED, C_PRIMARY};

/// A badge shown in the top-right of the pane header (e.g. "LIVE", "REC").
pub struct Badge<'a> {
    pub text: &'a str,
    pub color: Color,
}

/// Bordered pane titled "[key] title", with an optional badge.
pub fn pane_chrome<'a>(
    title: &'a str,
    key_hint: Option<char>,
    focused: bool,
    badge: Option<Badge<'a>>,
) -> Block<'a> {
    pane_chrome_borders(title, key_hint, focused, badge, Borders::ALL)
}

/// Like `pane_chrome` but with explicit border selection for stacked panes.
pub fn pane_chrome_borders<'a>(
    title: &'a str,
    key_hint: Option<char>,
    focused: bool,
    badge: Option<Badge<'a>>,
    borders: Borders,
) -> Block<'a> {
    let border_style = if focused {
        style_focused_border()
    } else {
        style_unfocused_border()
    };
    let title_style = if focused {
        Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(C_MUTED)
    };

    let mut title_spans = Vec::new();
    if let Some(key) = key_hint {
        title_spans.push(Span::styled(
            format!("[{}] ", key),
            Style::default().fg(C_KEY_HINT),
        ));
    }
    title_spans.push(Span::styled(title, title_style));

    let block = Block::default()
        .borders(borders)
        .border_style(border_style)
        .title(Line::from(title_spans));

    match badge {
        Some(b) => block.title_top(
            Line::from(Span::styled(
                format!(" {} ", b.text),
                Style::default().fg(b.color).add_modifier(Modifier::BOLD),
            ))
            .right_aligned(),
        ),
        None => block,
    }
}
