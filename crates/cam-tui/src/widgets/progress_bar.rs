//! Smooth Unicode progress bar for the recordings download.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::{C_LIVE, C_MUTED, C_SECONDARY};

/// Render `progress` (0.0..=1.0) with a byte counter on each side.
pub fn draw_progress(frame: &mut Frame, area: Rect, progress: f64, received: u64, total: u64) {
    if area.width < 4 || area.height == 0 {
        return;
    }

    let left_label = format_size(received);
    let right_label = format_size(total);
    let label_w = (left_label.len() + right_label.len() + 2) as u16;
    let bar = smooth_bar(progress, area.width.saturating_sub(label_w).max(4) as usize);

    let line = Line::from(vec![
        Span::styled(format!("{} ", left_label), Style::default().fg(C_SECONDARY)),
        Span::styled(bar, Style::default().fg(C_LIVE)),
        Span::styled(format!(" {}", right_label), Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// `width` cells, filled in eighths.
fn smooth_bar(progress: f64, width: usize) -> String {
    const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

    let eighths = (progress.clamp(0.0, 1.0) * width as f64 * 8.0) as usize;
    let full_blocks = eighths / 8;
    let partial = eighths % 8;

    let mut bar = String::with_capacity(width * 3);
    for _ in 0..full_blocks {
        bar.push('█');
    }
    if full_blocks < width {
        bar.push(BLOCKS[partial]);
        for _ in (full_blocks + 1)..width {
            bar.push(' ');
        }
    }
    bar
}

/// Human-readable byte count, binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_bar_width() {
        assert_eq!(smooth_bar(0.0, 10).chars().count(), 10);
        assert_eq!(smooth_bar(1.0, 10), "█".repeat(10));
        assert_eq!(smooth_bar(0.5, 4), "██  ");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
