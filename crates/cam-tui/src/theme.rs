//! Color palette and style helpers for the camera control panel.

use ratatui::style::{Color, Modifier, Style};

use cam_proto::protocol::VideoState;

// ── Color palette ─────────────────────────────────────────────────────────────

pub const C_BG: Color = Color::Rgb(18, 18, 18);
pub const C_ACCENT: Color = Color::Rgb(255, 95, 95);
pub const C_LIVE: Color = Color::Rgb(80, 200, 120);
pub const C_PENDING: Color = Color::Rgb(255, 184, 80);
pub const C_MUTED: Color = Color::Rgb(72, 72, 88);
pub const C_SECONDARY: Color = Color::Rgb(115, 115, 138);
pub const C_PRIMARY: Color = Color::Rgb(210, 210, 225);
pub const C_SELECTION_BG: Color = Color::Rgb(28, 28, 40);
pub const C_PANEL_BORDER: Color = Color::Rgb(40, 40, 52);
pub const C_PANEL_BORDER_FOCUSED: Color = Color::Rgb(120, 100, 200);
pub const C_KEY_HINT: Color = Color::Rgb(90, 90, 115);
pub const C_INPUT_BG: Color = Color::Rgb(20, 20, 32);
pub const C_INPUT_FG: Color = Color::Rgb(255, 200, 80);
pub const C_TOAST_INFO: Color = Color::Rgb(80, 160, 220);
pub const C_TOAST_SUCCESS: Color = Color::Rgb(80, 200, 120);
pub const C_TOAST_WARNING: Color = Color::Rgb(255, 184, 80);
pub const C_TOAST_ERROR: Color = Color::Rgb(255, 95, 95);
pub const C_MODE_NORMAL: Color = Color::Rgb(115, 115, 138);
pub const C_MODE_EDIT: Color = Color::Rgb(255, 200, 80);
pub const C_MODE_PICK: Color = Color::Rgb(80, 140, 200);

// ── Predefined styles ─────────────────────────────────────────────────────────

pub fn style_default() -> Style {
    Style::default().fg(C_PRIMARY)
}

pub fn style_secondary() -> Style {
    Style::default().fg(C_SECONDARY)
}

pub fn style_muted() -> Style {
    Style::default().fg(C_MUTED)
}

pub fn style_selected_focused() -> Style {
    Style::default()
        .bg(C_SELECTION_BG)
        .fg(C_PRIMARY)
        .add_modifier(Modifier::BOLD)
}

pub fn style_focused_border() -> Style {
    Style::default().fg(C_PANEL_BORDER_FOCUSED)
}

pub fn style_unfocused_border() -> Style {
    Style::default().fg(C_PANEL_BORDER)
}

pub fn style_input() -> Style {
    Style::default().fg(C_INPUT_FG).bg(C_INPUT_BG)
}

/// A control label: bright when usable, dimmed otherwise.
pub fn style_control(enabled: bool) -> Style {
    if enabled {
        Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD)
    } else {
        style_muted()
    }
}

pub fn video_state_color(state: VideoState) -> Color {
    match state {
        VideoState::Unknown => C_MUTED,
        VideoState::Idle => C_SECONDARY,
        VideoState::Previewing => C_LIVE,
        VideoState::Recording => C_ACCENT,
        VideoState::InsufficientStorage => C_PENDING,
    }
}
