//! Toast notifications plus the busy spinner, drawn top-right.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use crate::theme::{C_TOAST_ERROR, C_TOAST_INFO, C_TOAST_SUCCESS, C_TOAST_WARNING};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    fn color(self) -> Color {
        match self {
            Severity::Info => C_TOAST_INFO,
            Severity::Success => C_TOAST_SUCCESS,
            Severity::Warning => C_TOAST_WARNING,
            Severity::Error => C_TOAST_ERROR,
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Severity::Info => "·",
            Severity::Success => "✓",
            Severity::Warning => "!",
            Severity::Error => "✗",
        }
    }

    fn lifetime(self) -> Duration {
        match self {
            Severity::Info | Severity::Success => Duration::from_secs(3),
            Severity::Warning => Duration::from_secs(4),
            Severity::Error => Duration::from_secs(5),
        }
    }
}

struct Toast {
    message: String,
    severity: Severity,
    expires: Instant,
}

/// Persistent spinner that animates until dismissed.
struct Spinner {
    message: String,
    frame: usize,
}

const SPINNER_FRAMES: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
const MAX_VISIBLE: usize = 4;

#[derive(Default)]
pub struct ToastManager {
    toasts: VecDeque<Toast>,
    spinner: Option<Spinner>,
}

impl ToastManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        self.toasts.retain(|t| t.message != message);
        self.toasts.push_back(Toast {
            message,
            severity,
            expires: Instant::now() + severity.lifetime(),
        });
        while self.toasts.len() > MAX_VISIBLE * 2 {
            self.toasts.pop_front();
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Info);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Success);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Warning);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Error);
    }

    /// Show (or relabel) the spinner. Animates on `tick()` until dismissed.
    pub fn spinner(&mut self, message: impl Into<String>) {
        let message = message.into();
        match self.spinner.as_mut() {
            Some(s) => s.message = message,
            None => self.spinner = Some(Spinner { message, frame: 0 }),
        }
    }

    pub fn dismiss_spinner(&mut self) {
        self.spinner = None;
    }

    #[cfg(test)]
    pub fn has_spinner(&self) -> bool {
        self.spinner.is_some()
    }

    /// Drop expired toasts and advance the spinner. Call each UI tick.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.toasts.retain(|t| t.expires > now);
        if let Some(s) = self.spinner.as_mut() {
            s.frame = (s.frame + 1) % SPINNER_FRAMES.len();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty() && self.spinner.is_none()
    }

    /// Render in the top-right corner of `area`, spinner first, newest toast next.
    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        if self.is_empty() {
            return;
        }
        let max_width = (area.width / 2).clamp(30, 60);
        let bottom = area.y + area.height;
        let mut y = area.y + 1;

        let rows = self
            .spinner
            .iter()
            .map(|s| (SPINNER_FRAMES[s.frame], s.message.as_str(), C_TOAST_INFO))
            .chain(
                self.toasts
                    .iter()
                    .rev()
                    .take(MAX_VISIBLE)
                    .map(|t| (t.severity.icon(), t.message.as_str(), t.severity.color())),
            );

        for (icon, message, color) in rows {
            if y >= bottom {
                break;
            }
            let w = (message.chars().count() as u16 + 4).min(max_width).min(area.width);
            let toast_area = Rect {
                x: area.x + area.width.saturating_sub(w + 1),
                y,
                width: w,
                height: 1,
            };
            frame.render_widget(Clear, toast_area);
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(
                    format!(" {} {} ", icon, message),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))),
                toast_area,
            );
            y += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let mut toasts = ToastManager::new();
        toasts.info("hello");
        toasts.info("hello");
        assert_eq!(toasts.toasts.len(), 1);
    }

    #[test]
    fn test_spinner_lifecycle() {
        let mut toasts = ToastManager::new();
        toasts.spinner("working");
        toasts.tick();
        toasts.spinner("still working");
        assert!(toasts.has_spinner());
        assert_eq!(toasts.spinner.as_ref().unwrap().frame, 1);
        toasts.dismiss_spinner();
        assert!(toasts.is_empty());
    }
}
