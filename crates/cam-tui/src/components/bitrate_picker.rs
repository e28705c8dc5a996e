//! BitratePicker — popup list of the device's bitrate descriptions.
//!
//! Opens on the currently selected bitrate. Enter sends the highlighted
//! description to the coordinator, which maps it back to the bitrate name.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Clear, List, ListItem, ListState},
    Frame,
};

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    components::help_overlay::centered_rect,
    coordinator::Intent,
    theme::{style_default, style_selected_focused, C_BG, C_LIVE},
    widgets::pane_chrome::pane_chrome,
};

pub struct BitratePicker {
    list: ListState,
    visible: bool,
}

impl BitratePicker {
    pub fn new() -> Self {
        Self {
            list: ListState::default(),
            visible: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn open(&mut self, state: &AppState) {
        let snapshot = &state.snapshot;
        let current = snapshot.selected_bitrate().and_then(|selected| {
            snapshot
                .supported_bitrates
                .iter()
                .position(|b| b.name == selected.name)
        });
        self.list.select(current.or(Some(0)));
        self.visible = true;
    }

    fn step(&mut self, delta: isize, len: usize) {
        if len == 0 {
            return;
        }
        let current = self.list.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.list.select(Some(next as usize));
    }
}

impl Default for BitratePicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for BitratePicker {
    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if !self.visible || key.kind == KeyEventKind::Release {
            return vec![];
        }
        let bitrates = &state.snapshot.supported_bitrates;
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.step(-1, bitrates.len()),
            KeyCode::Down | KeyCode::Char('j') => self.step(1, bitrates.len()),
            KeyCode::Home | KeyCode::Char('g') => self.list.select(Some(0)),
            KeyCode::End | KeyCode::Char('G') => {
                self.list.select(Some(bitrates.len().saturating_sub(1)))
            }
            KeyCode::Esc | KeyCode::Char('q') => return vec![Action::CloseBitratePicker],
            KeyCode::Enter => {
                let chosen = self
                    .list
                    .selected()
                    .and_then(|i| bitrates.get(i))
                    .map(|b| b.description.clone());
                let mut actions = vec![Action::CloseBitratePicker];
                if let Some(description) = chosen {
                    actions.push(Action::Device(Intent::ChangeBitrate(description)));
                }
                return actions;
            }
            _ => {}
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, state: &AppState) -> Vec<Action> {
        match action {
            Action::OpenBitratePicker => self.open(state),
            Action::CloseBitratePicker => self.visible = false,
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, state: &AppState) {
        if !self.visible {
            return;
        }
        let bitrates = &state.snapshot.supported_bitrates;
        let selected_name = state.snapshot.selected_bitrate().map(|b| b.name.as_str());

        let popup = centered_rect(50, bitrates.len() as u16 + 2, area);
        let items: Vec<ListItem> = bitrates
            .iter()
            .map(|b| {
                let marker = if Some(b.name.as_str()) == selected_name {
                    Span::styled(" ● ", Style::default().fg(C_LIVE))
                } else {
                    Span::raw("   ")
                };
                ListItem::new(Line::from(vec![
                    marker,
                    Span::styled(b.description.as_str(), style_default()),
                ]))
            })
            .collect();

        frame.render_widget(Clear, popup);
        let list = List::new(items)
            .block(pane_chrome("bitrate", Some('b'), true, None).style(Style::default().bg(C_BG)))
            .highlight_style(style_selected_focused());
        frame.render_stateful_widget(list, popup, &mut self.list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_proto::protocol::{Bitrate, DeviceSnapshot, VideoState};
    use ratatui::crossterm::event::KeyModifiers;
    use std::path::PathBuf;

    fn state() -> AppState {
        let mut state = AppState::new("http://h".into(), PathBuf::new(), PathBuf::new());
        state.snapshot = DeviceSnapshot::from_split(VideoState::Idle, 0, String::new()).with_bitrates(
            vec![
                Bitrate::new("1", "1 Mbit/s"),
                Bitrate::new("2.5", "2.5 Mbit/s"),
                Bitrate::new("4.5", "4.5 Mbit/s"),
            ],
            Some("2.5".to_string()),
        );
        state
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_opens_on_current_and_sends_description() {
        let state = state();
        let mut picker = BitratePicker::new();
        picker.on_action(&Action::OpenBitratePicker, &state);
        assert!(picker.is_visible());
        assert_eq!(picker.list.selected(), Some(1));

        picker.handle_key(key(KeyCode::Down), &state);
        picker.handle_key(key(KeyCode::Down), &state);
        assert_eq!(picker.list.selected(), Some(2));

        assert_eq!(
            picker.handle_key(key(KeyCode::Enter), &state),
            vec![
                Action::CloseBitratePicker,
                Action::Device(Intent::ChangeBitrate("4.5 Mbit/s".into())),
            ]
        );
    }

    #[test]
    fn test_escape_sends_nothing() {
        let state = state();
        let mut picker = BitratePicker::new();
        picker.on_action(&Action::OpenBitratePicker, &state);
        assert_eq!(
            picker.handle_key(key(KeyCode::Esc), &state),
            vec![Action::CloseBitratePicker]
        );
        picker.on_action(&Action::CloseBitratePicker, &state);
        assert!(!picker.is_visible());
    }
}
