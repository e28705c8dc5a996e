//! Which controls are usable, derived from device state and UI activity.

use cam_proto::protocol::VideoState;

use crate::coordinator::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub endpoint: bool,
    pub preview: bool,
    pub recording: bool,
    pub bitrate: bool,
    pub download: bool,
    /// Show the busy indicator.
    pub busy: bool,
}

impl Controls {
    /// Pure function of its inputs; recompute whenever one of them changes.
    pub fn derive(state: VideoState, busy: usize, editing_endpoint: bool) -> Self {
        let free = busy == 0 && !editing_endpoint;
        let known = state.is_known();
        let not_recording = known && state != VideoState::Recording;
        Self {
            endpoint: true,
            preview: free && not_recording,
            recording: free && known,
            bitrate: free && not_recording,
            download: free && not_recording,
            busy: busy > 0,
        }
    }

    pub fn allows(&self, intent: &Intent) -> bool {
        match intent {
            Intent::TogglePreview => self.preview,
            Intent::ToggleRecording => self.recording,
            Intent::ChangeBitrate(_) => self.bitrate,
            Intent::ChangeEndpoint(_) => self.endpoint,
            Intent::DownloadRecordings => self.download,
        }
    }
}

pub fn preview_label(state: VideoState) -> &'static str {
    if state == VideoState::Previewing {
        "Hide Video Preview"
    } else {
        "Show Video Preview"
    }
}

pub fn recording_label(state: VideoState) -> &'static str {
    if state == VideoState::Recording {
        "Stop Video Recording"
    } else {
        "Start Video Recording"
    }
}
