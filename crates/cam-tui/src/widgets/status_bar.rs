//! Status bar — bottom line with input mode and keybindings.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::{C_MODE_EDIT, C_MODE_NORMAL, C_MODE_PICK, C_MUTED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// The endpoint field has the keyboard; device controls are disabled.
    EditEndpoint,
    PickBitrate,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::EditEndpoint => "ENDPOINT",
            Self::PickBitrate => "BITRATE",
        }
    }

    pub fn color(self) -> ratatui::style::Color {
        match self {
            Self::Normal => C_MODE_NORMAL,
            Self::EditEndpoint => C_MODE_EDIT,
            Self::PickBitrate => C_MODE_PICK,
        }
    }

    fn keys(self) -> &'static str {
        match self {
            Self::Normal => {
                " p preview  r record  b bitrate  d download  y copy url  e endpoint  L logs  ? help  q quit"
            }
            Self::EditEndpoint => " type url  Enter save + refresh  Esc cancel",
            Self::PickBitrate => " ↑↓/jk select  Enter apply  Esc cancel",
        }
    }
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, mode: InputMode) {
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default().fg(mode.color()).add_modifier(Modifier::BOLD),
        ),
        Span::styled(mode.keys(), Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
