//! AppState — shared read-only data passed to all components during render/event.
//!
//! Only the App event loop writes to it, mirroring what the `Store` and the
//! downloader publish.

use std::path::PathBuf;

use cam_proto::protocol::DeviceSnapshot;

use crate::controls::Controls;
use crate::download::DownloadStatus;
use crate::reconcile::LoopPhase;
use crate::widgets::status_bar::InputMode;

/// Lines kept for the log panel.
pub const MAX_LOG_LINES: usize = 500;

pub struct AppState {
    // ── Device ──────────────────────────────────────────────────────────────
    pub snapshot: DeviceSnapshot,
    pub endpoint: String,
    pub busy: usize,
    pub loop_phase: LoopPhase,
    pub last_sync: Option<chrono::DateTime<chrono::Local>>,

    // ── UI mode ─────────────────────────────────────────────────────────────
    pub input_mode: InputMode,

    // ── Downloads ───────────────────────────────────────────────────────────
    pub download: DownloadStatus,
    pub downloads_dir: PathBuf,

    // ── Session ─────────────────────────────────────────────────────────────
    /// WARN/ERROR lines from tracing plus app notices, newest last.
    pub logs: Vec<String>,
    pub log_path: PathBuf,
}

impl AppState {
    pub fn new(endpoint: String, downloads_dir: PathBuf, log_path: PathBuf) -> Self {
        Self {
            snapshot: DeviceSnapshot::unknown(),
            endpoint,
            busy: 0,
            loop_phase: LoopPhase::Stopped,
            last_sync: None,
            input_mode: InputMode::Normal,
            download: DownloadStatus::Idle,
            downloads_dir,
            logs: Vec::new(),
            log_path,
        }
    }

    /// Current enablement of every control.
    pub fn controls(&self) -> Controls {
        Controls::derive(
            self.snapshot.video_state,
            self.busy,
            self.input_mode == InputMode::EditEndpoint,
        )
    }

    pub fn push_log(&mut self, line: String) {
        self.logs.push(line);
        if self.logs.len() > MAX_LOG_LINES {
            let excess = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_proto::protocol::VideoState;

    #[test]
    fn test_editing_endpoint_disables_controls() {
        let mut state = AppState::new("http://h".into(), PathBuf::new(), PathBuf::new());
        state.snapshot = DeviceSnapshot::from_split(VideoState::Idle, 0, String::new());
        assert!(state.controls().preview);
        state.input_mode = InputMode::EditEndpoint;
        assert!(!state.controls().preview);
        assert!(state.controls().endpoint);
    }

    #[test]
    fn test_log_is_capped() {
        let mut state = AppState::new("http://h".into(), PathBuf::new(), PathBuf::new());
        for i in 0..MAX_LOG_LINES + 10 {
            state.push_log(format!("line {}", i));
        }
        assert_eq!(state.logs.len(), MAX_LOG_LINES);
        assert_eq!(state.logs[0], "line 10");
    }
}
