//! EndpointBar — top pane showing the device endpoint and sync status.
//!
//! `e` opens the editor (App switches to `InputMode::EditEndpoint`); Enter
//! commits through the coordinator, Esc restores the current endpoint.

use ratatui::crossterm::event::{KeyEvent, KeyEventKind};
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    coordinator::Intent,
    reconcile::LoopPhase,
    theme::{style_default, style_muted, style_secondary, C_ACCENT, C_LIVE, C_MUTED, C_PENDING},
    widgets::{
        pane_chrome::{pane_chrome, Badge},
        text_input::{InputAction, TextInput},
    },
};

pub struct EndpointBar {
    input: TextInput,
    editing: bool,
}

impl EndpointBar {
    pub fn new() -> Self {
        Self {
            input: TextInput::new("url"),
            editing: false,
        }
    }

    #[cfg(test)]
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    fn badge(state: &AppState) -> Badge<'static> {
        if state.loop_phase == LoopPhase::Running {
            Badge {
                text: "SYNC",
                color: C_PENDING,
            }
        } else if state.snapshot.is_known() {
            Badge {
                text: "LIVE",
                color: C_LIVE,
            }
        } else if state.loop_phase == LoopPhase::Stopped {
            Badge {
                text: "IDLE",
                color: C_MUTED,
            }
        } else {
            Badge {
                text: "OFFLINE",
                color: C_ACCENT,
            }
        }
    }
}

impl Default for EndpointBar {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for EndpointBar {
    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if !self.editing || key.kind == KeyEventKind::Release {
            return vec![];
        }
        match self.input.handle_key(key) {
            InputAction::Edited => vec![],
            InputAction::Cancelled => vec![Action::CloseEndpointEditor],
            InputAction::Confirmed(url) if url.is_empty() => vec![Action::CloseEndpointEditor],
            InputAction::Confirmed(url) => vec![
                Action::CloseEndpointEditor,
                Action::Device(Intent::ChangeEndpoint(url)),
            ],
        }
    }

    fn on_action(&mut self, action: &Action, state: &AppState) -> Vec<Action> {
        match action {
            Action::EditEndpoint => {
                self.input.set_value(&state.endpoint);
                self.editing = true;
            }
            Action::CloseEndpointEditor => self.editing = false,
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let block = pane_chrome("endpoint", Some('e'), focused || self.editing, Some(Self::badge(state)));
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        if self.editing {
            self.input.draw(frame, inner);
            return;
        }

        let synced = state
            .last_sync
            .map(|t| format!("  last sync {}", t.format("%H:%M:%S")))
            .unwrap_or_default();
        let line = Line::from(vec![
            Span::styled("url ", style_muted()),
            Span::styled(state.endpoint.as_str(), style_default()),
            Span::styled(synced, style_secondary()),
        ]);
        frame.render_widget(Paragraph::new(line), inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use std::path::PathBuf;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_commit_emits_endpoint_change() {
        let state = AppState::new("http://old".into(), PathBuf::new(), PathBuf::new());
        let mut bar = EndpointBar::new();
        assert!(bar.handle_key(key(KeyCode::Char('x')), &state).is_empty());

        bar.on_action(&Action::EditEndpoint, &state);
        assert!(bar.is_editing());
        for _ in 0.."old".len() {
            bar.handle_key(key(KeyCode::Backspace), &state);
        }
        for c in "new".chars() {
            bar.handle_key(key(KeyCode::Char(c)), &state);
        }
        let actions = bar.handle_key(key(KeyCode::Enter), &state);
        assert_eq!(
            actions,
            vec![
                Action::CloseEndpointEditor,
                Action::Device(Intent::ChangeEndpoint("http://new".into())),
            ]
        );
    }

    #[test]
    fn test_escape_and_empty_commit_change_nothing() {
        let state = AppState::new("http://old".into(), PathBuf::new(), PathBuf::new());
        let mut bar = EndpointBar::new();
        bar.on_action(&Action::EditEndpoint, &state);
        assert_eq!(
            bar.handle_key(key(KeyCode::Esc), &state),
            vec![Action::CloseEndpointEditor]
        );

        bar.on_action(&Action::EditEndpoint, &state);
        for _ in 0.."http://old".len() {
            bar.handle_key(key(KeyCode::Backspace), &state);
        }
        assert_eq!(
            bar.handle_key(key(KeyCode::Enter), &state),
            vec![Action::CloseEndpointEditor]
        );
    }
}
