//! DevicePanel — the device readout and its controls.
//!
//! Layout (inside the pane):
//!   state / free space / recorded / bitrate / preview url
//!   control row (preview, record, bitrate, download), dimmed when disabled
//!   download progress, when a download is running or just ended

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use cam_proto::protocol::VideoState;

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    controls::{preview_label, recording_label},
    coordinator::Intent,
    download::DownloadStatus,
    theme::{
        style_control, style_default, style_muted, style_secondary, video_state_color, C_ACCENT,
        C_KEY_HINT, C_LIVE, C_PENDING,
    },
    widgets::{
        pane_chrome::{pane_chrome, Badge},
        progress_bar::{draw_progress, format_size},
    },
};

pub struct DevicePanel;

impl DevicePanel {
    pub fn new() -> Self {
        Self
    }

    /// Busy wins over the device state while an action is in flight.
    fn badge(state: &AppState) -> Badge<'_> {
        let video_state = state.snapshot.video_state;
        if state.controls().busy {
            return Badge {
                text: "BUSY",
                color: C_PENDING,
            };
        }
        Badge {
            text: match video_state {
                VideoState::Recording => "REC",
                VideoState::Previewing => "PREVIEW",
                _ => video_state.label(),
            },
            color: video_state_color(video_state),
        }
    }

    fn readout(state: &AppState) -> Vec<Line<'_>> {
        let snapshot = &state.snapshot;
        let bitrate = snapshot
            .selected_bitrate()
            .map(|b| b.description.as_str())
            .unwrap_or("");
        let preview = if snapshot.preview_url.is_empty() {
            Span::styled("none", style_muted())
        } else {
            Span::styled(snapshot.preview_url.as_str(), style_default())
        };

        vec![
            field(
                "state",
                Span::styled(
                    format!("● {}", snapshot.video_state.label()),
                    Style::default()
                        .fg(video_state_color(snapshot.video_state))
                        .add_modifier(Modifier::BOLD),
                ),
            ),
            field(
                "free space",
                Span::styled(format!("{} MB", snapshot.free_space_megabytes()), style_default()),
            ),
            field(
                "recorded",
                Span::styled(format!("{} MB", snapshot.recorded_megabytes()), style_default()),
            ),
            field("bitrate", Span::styled(bitrate, style_default())),
            field("preview", preview),
        ]
    }

    fn control_row(state: &AppState) -> Line<'static> {
        let controls = state.controls();
        let video_state = state.snapshot.video_state;
        let mut spans = Vec::new();
        for (key, label, enabled) in [
            ('p', preview_label(video_state), controls.preview),
            ('r', recording_label(video_state), controls.recording),
            ('b', "Bitrate", controls.bitrate),
            ('d', "Download Recordings", controls.download),
        ] {
            spans.push(Span::styled(format!(" [{}] ", key), Style::default().fg(C_KEY_HINT)));
            spans.push(Span::styled(label, style_control(enabled)));
            spans.push(Span::raw(" "));
        }
        Line::from(spans)
    }

    fn draw_download(frame: &mut Frame, area: Rect, state: &AppState) {
        let line = match &state.download {
            DownloadStatus::Idle => return,
            DownloadStatus::Downloading {
                received,
                total: Some(total),
            } => {
                let fraction = state.download.fraction().unwrap_or(0.0);
                draw_progress(frame, area, fraction, *received, *total);
                return;
            }
            DownloadStatus::Downloading { received, total: None } => Line::from(vec![
                Span::styled(" downloading ", style_secondary()),
                Span::styled(format_size(*received), style_default()),
            ]),
            DownloadStatus::Finished(path) => Line::from(vec![
                Span::styled(" saved ", Style::default().fg(C_LIVE)),
                Span::styled(path.display().to_string(), style_default()),
            ]),
            DownloadStatus::Failed(e) => Line::from(vec![
                Span::styled(" download failed ", Style::default().fg(C_ACCENT)),
                Span::styled(e.clone(), style_secondary()),
            ]),
        };
        frame.render_widget(Paragraph::new(line), area);
    }
}

impl Default for DevicePanel {
    fn default() -> Self {
        Self::new()
    }
}

fn field<'a>(name: &'a str, value: Span<'a>) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!(" {:<12}", name), style_muted()),
        value,
    ])
}

impl Component for DevicePanel {
    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        match key.code {
            KeyCode::Char('p') => vec![Action::Device(Intent::TogglePreview)],
            KeyCode::Char('r') => vec![Action::Device(Intent::ToggleRecording)],
            KeyCode::Char('d') => vec![Action::Device(Intent::DownloadRecordings)],
            KeyCode::Char('b') => vec![Action::OpenBitratePicker],
            KeyCode::Char('y') if !state.snapshot.preview_url.is_empty() => {
                vec![Action::CopyToClipboard(state.snapshot.preview_url.clone())]
            }
            _ => vec![],
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let block = pane_chrome("device", None, focused, Some(Self::badge(state)));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
            ])
            .split(inner);

        frame.render_widget(Paragraph::new(Self::readout(state)), rows[0]);
        frame.render_widget(Paragraph::new(Self::control_row(state)), rows[2]);
        Self::draw_download(frame, rows[3], state);
    }
}
