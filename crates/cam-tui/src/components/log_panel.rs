//! LogPanel component — warnings and errors from the session.
//!
//! One line (most recent entry) when collapsed; a scrollable pane when
//! expanded with `L`.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Borders, Clear, Paragraph},
    Frame,
};

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    theme::{C_MUTED, C_SECONDARY},
    widgets::pane_chrome::pane_chrome_borders,
};

/// Rows used by the panel when expanded.
pub const EXPANDED_HEIGHT: u16 = 10;

pub struct LogPanel {
    pub expanded: bool,
    scroll: usize,
    /// Follow new entries while scrolled to the bottom.
    follow: bool,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            expanded: false,
            scroll: 0,
            follow: true,
        }
    }

    pub fn height(&self) -> u16 {
        if self.expanded {
            EXPANDED_HEIGHT
        } else {
            1
        }
    }

    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
        if self.expanded {
            self.follow = true;
        }
    }
}

impl Default for LogPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for LogPanel {
    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if !self.expanded || key.kind == KeyEventKind::Release {
            return vec![];
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.scroll = self.scroll.saturating_sub(1);
                self.follow = false;
            }
            KeyCode::Down | KeyCode::Char('j') => self.scroll += 1,
            KeyCode::PageUp => {
                self.scroll = self.scroll.saturating_sub(10);
                self.follow = false;
            }
            KeyCode::PageDown => self.scroll += 10,
            KeyCode::Home | KeyCode::Char('g') => {
                self.scroll = 0;
                self.follow = false;
            }
            KeyCode::End | KeyCode::Char('G') => self.follow = true,
            _ => {}
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        if let Action::ToggleLogs = action {
            self.toggle();
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        if area.height == 0 {
            return;
        }
        frame.render_widget(Clear, area);

        if !self.expanded || area.height <= 1 {
            let last = latest_entry(&state.logs).to_string();
            frame.render_widget(
                Paragraph::new(Line::from(vec![
                    Span::styled(" log ", Style::default().fg(C_MUTED)),
                    Span::styled(last, Style::default().fg(C_SECONDARY)),
                ])),
                area,
            );
            return;
        }

        let block = pane_chrome_borders("log", Some('L'), focused, None, Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let logs = &state.logs;
        if logs.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no log entries yet", Style::default().fg(C_MUTED))),
                inner,
            );
            return;
        }

        // Newest last; scroll 0 shows the oldest entries.
        let height = inner.height as usize;
        let max_scroll = logs.len().saturating_sub(height);
        if self.follow || self.scroll >= max_scroll {
            self.scroll = max_scroll;
            self.follow = true;
        }

        let lines: Vec<Line> = logs
            .iter()
            .skip(self.scroll)
            .take(height)
            .map(|msg| {
                Line::from(vec![
                    Span::raw("  "),
                    Span::styled(msg.as_str(), Style::default().fg(C_MUTED)),
                ])
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), inner);
    }
}

/// Collapsed view: the newest entry, or a placeholder.
fn latest_entry(logs: &[String]) -> &str {
    logs.last().map(String::as_str).unwrap_or("(no warnings)")
}
