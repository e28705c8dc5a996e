//! TextInput — single-line editor over tui-input, used for the endpoint.

use ratatui::crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::theme::{style_input, style_muted};

#[derive(Debug, PartialEq)]
pub enum InputAction {
    Edited,
    Confirmed(String),
    Cancelled,
}

pub struct TextInput {
    input: Input,
    prompt: &'static str,
}

impl TextInput {
    pub fn new(prompt: &'static str) -> Self {
        Self {
            input: Input::default(),
            prompt,
        }
    }

    pub fn set_value(&mut self, value: &str) {
        self.input = Input::new(value.to_string());
    }

    #[cfg(test)]
    pub fn text(&self) -> &str {
        self.input.value()
    }

    /// Enter confirms with the trimmed text, Esc cancels, anything else edits.
    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        match key.code {
            KeyCode::Esc => InputAction::Cancelled,
            KeyCode::Enter => InputAction::Confirmed(self.input.value().trim().to_string()),
            _ => {
                self.input.handle_event(&Event::Key(key));
                InputAction::Edited
            }
        }
    }

    /// Render the editor into a one-row `area` and place the cursor.
    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        let prompt_w = self.prompt.chars().count() + 1;
        let width = (area.width as usize).saturating_sub(prompt_w + 1);
        let scroll = self.input.visual_scroll(width);
        let value = self.input.value();

        let shown: String = value.chars().skip(scroll).collect();
        let line = Line::from(vec![
            Span::styled(format!("{} ", self.prompt), style_muted()),
            Span::styled(shown, style_input()),
        ]);
        frame.render_widget(Paragraph::new(line).style(style_input()), area);

        let cursor_x = area.x + (prompt_w + self.input.visual_cursor().saturating_sub(scroll)) as u16;
        frame.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(1)), area.y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_edit_and_confirm() {
        let mut input = TextInput::new(">");
        input.set_value("http://cam.local");
        assert_eq!(input.handle_key(key(KeyCode::Char(':'))), InputAction::Edited);
        input.handle_key(key(KeyCode::Char('9')));
        assert_eq!(input.text(), "http://cam.local:9");
        assert_eq!(
            input.handle_key(key(KeyCode::Enter)),
            InputAction::Confirmed("http://cam.local:9".to_string())
        );
    }

    #[test]
    fn test_escape_cancels() {
        let mut input = TextInput::new(">");
        input.set_value("http://a");
        assert_eq!(input.handle_key(key(KeyCode::Esc)), InputAction::Cancelled);
        assert_eq!(input.text(), "http://a");
    }
}
