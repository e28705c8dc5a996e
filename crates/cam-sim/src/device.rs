//! In-memory camera model.
//!
//! Mirrors the behaviour of the real recorder closely enough for the control
//! panel to be exercised end to end: the same state words, the same
//! refusals, the same bitrate menu. Recording "writes" bytes at the selected
//! bitrate, which shrinks free space and grows the recordings list.

use std::sync::Arc;
use std::time::Instant;

use cam_proto::protocol::{Bitrate, GlobalState, VideoState};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Recording is refused below this much free space.
pub const MIN_FREE_SPACE_BYTES: u64 = 100 * 1024 * 1024;

/// `(name, description, bits per second)`
pub const BITRATES: &[(&str, &str, u64)] = &[
    ("1", "1 Mbit/s (YouTube 480p)", 1_000_000),
    ("2.5", "2.5 Mbit/s (YouTube 720p)", 2_500_000),
    ("4.5", "4.5 Mbit/s (YouTube 1080p)", 4_500_000),
];

pub fn bitrate_names() -> Vec<&'static str> {
    BITRATES.iter().map(|(name, _, _)| *name).collect()
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub preview_url: String,
    pub bitrate: String,
    pub free_space_bytes: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            preview_url: "http://127.0.0.1:8081/?action=stream".to_string(),
            bitrate: "2.5".to_string(),
            free_space_bytes: 32 * 1024 * 1024 * 1024,
        }
    }
}

/// A finished recording segment.
#[derive(Debug, Clone)]
pub struct Recording {
    pub file_name: String,
    pub size_bytes: u64,
}

struct DeviceState {
    video_state: VideoState,
    bitrate: usize,
    preview_url: String,
    free_space_bytes: u64,
    recordings: Vec<Recording>,
    recording_since: Option<(Instant, String)>,
}

impl DeviceState {
    fn bits_per_second(&self) -> u64 {
        BITRATES[self.bitrate].2
    }

    fn finish_recording(&mut self) {
        let Some((since, file_name)) = self.recording_since.take() else {
            return;
        };
        let size_bytes = since.elapsed().as_secs() * self.bits_per_second() / 8;
        self.free_space_bytes = self.free_space_bytes.saturating_sub(size_bytes);
        info!("finished recording {} ({} bytes)", file_name, size_bytes);
        self.recordings.push(Recording {
            file_name,
            size_bytes,
        });
    }
}

/// Outcome of a device command: `Ok(())` or the refusal message.
pub type CommandResult = Result<(), String>;

#[derive(Clone)]
pub struct SimDevice {
    state: Arc<RwLock<DeviceState>>,
}

impl SimDevice {
    pub fn new(config: SimConfig) -> anyhow::Result<Self> {
        let bitrate = bitrate_index(&config.bitrate)
            .ok_or_else(|| anyhow::anyhow!("unknown bitrate {:?}", config.bitrate))?;
        Ok(Self {
            state: Arc::new(RwLock::new(DeviceState {
                video_state: VideoState::Idle,
                bitrate,
                preview_url: config.preview_url,
                free_space_bytes: config.free_space_bytes,
                recordings: Vec::new(),
                recording_since: None,
            })),
        })
    }

    pub async fn video_state(&self) -> VideoState {
        self.state.read().await.video_state
    }

    pub async fn free_space_bytes(&self) -> u64 {
        self.state.read().await.free_space_bytes
    }

    pub async fn preview_url(&self) -> String {
        self.state.read().await.preview_url.clone()
    }

    pub async fn recordings(&self) -> Vec<Recording> {
        self.state.read().await.recordings.clone()
    }

    pub async fn global_state(&self) -> GlobalState {
        let state = self.state.read().await;
        GlobalState {
            video_state: state.video_state,
            free_space_bytes: state.free_space_bytes,
            recorded_videos_size_bytes: state.recordings.iter().map(|r| r.size_bytes).sum(),
            video_preview_url: Some(state.preview_url.clone()),
            supported_bitrates: BITRATES
                .iter()
                .map(|(name, description, _)| Bitrate::new(*name, *description))
                .collect(),
            bitrate: Some(BITRATES[state.bitrate].0.to_string()),
        }
    }

    pub async fn start_preview(&self) -> CommandResult {
        let mut state = self.state.write().await;
        match state.video_state {
            VideoState::Previewing => Ok(()),
            VideoState::Recording => Err("cannot preview while recording in progress".to_string()),
            _ => {
                state.video_state = VideoState::Previewing;
                info!("preview started");
                Ok(())
            }
        }
    }

    pub async fn stop_preview(&self) -> CommandResult {
        let mut state = self.state.write().await;
        if state.video_state == VideoState::Previewing {
            state.video_state = VideoState::Idle;
            info!("preview stopped");
        }
        Ok(())
    }

    pub async fn start_recording(&self) -> CommandResult {
        let mut state = self.state.write().await;
        match state.video_state {
            VideoState::Recording => return Ok(()),
            VideoState::Previewing => {
                return Err("cannot record while previewing in progress".to_string())
            }
            _ => {}
        }
        if state.free_space_bytes <= MIN_FREE_SPACE_BYTES {
            state.video_state = VideoState::InsufficientStorage;
            return Err("not enough of free space".to_string());
        }
        let file_name = format!("{}.h264", chrono::Local::now().format("%Y_%m_%d__%H_%M_%S"));
        info!(
            "recording {} at {} bit/s",
            file_name,
            state.bits_per_second()
        );
        state.recording_since = Some((Instant::now(), file_name));
        state.video_state = VideoState::Recording;
        Ok(())
    }

    pub async fn stop_recording(&self) -> CommandResult {
        let mut state = self.state.write().await;
        if state.video_state == VideoState::Recording {
            state.finish_recording();
            state.video_state = VideoState::Idle;
        }
        Ok(())
    }

    pub async fn set_bitrate(&self, name: &str) -> CommandResult {
        let mut state = self.state.write().await;
        if state.video_state == VideoState::Recording {
            return Err("Cannot change bitrate while recording".to_string());
        }
        let idx = bitrate_index(name)
            .ok_or_else(|| format!("Could not find a bitrate with short name {}", name))?;
        debug!("bitrate {} -> {}", BITRATES[state.bitrate].0, name);
        state.bitrate = idx;
        Ok(())
    }

    /// Drop every stored recording and give its space back. Refused while a
    /// recording is running.
    pub async fn delete_recordings(&self) -> CommandResult {
        let mut state = self.state.write().await;
        if state.video_state == VideoState::Recording {
            return Err("cannot remove recorded videos during recording".to_string());
        }
        let freed: u64 = state.recordings.drain(..).map(|r| r.size_bytes).sum();
        state.free_space_bytes = state.free_space_bytes.saturating_add(freed);
        info!("recordings deleted, {} bytes freed", freed);
        Ok(())
    }
}

fn bitrate_index(name: &str) -> Option<usize> {
    BITRATES.iter().position(|(n, _, _)| *n == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SimDevice {
        SimDevice::new(SimConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_record_refused_while_previewing() {
        let device = device();
        device.start_preview().await.unwrap();
        assert!(device.start_recording().await.is_err());
        device.stop_preview().await.unwrap();
        device.start_recording().await.unwrap();
        assert_eq!(device.video_state().await, VideoState::Recording);
        assert!(device.start_preview().await.is_err());
        assert!(device.set_bitrate("1").await.is_err());
        device.stop_recording().await.unwrap();
        assert_eq!(device.video_state().await, VideoState::Idle);
        assert_eq!(device.recordings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_storage() {
        let device = SimDevice::new(SimConfig {
            free_space_bytes: MIN_FREE_SPACE_BYTES,
            ..SimConfig::default()
        })
        .unwrap();
        assert_eq!(
            device.start_recording().await,
            Err("not enough of free space".to_string())
        );
        assert_eq!(device.video_state().await, VideoState::InsufficientStorage);
        // Preview is still allowed from there.
        device.start_preview().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_bitrate_by_name() {
        let device = device();
        device.set_bitrate("4.5").await.unwrap();
        assert_eq!(device.global_state().await.bitrate.as_deref(), Some("4.5"));
        assert!(device.set_bitrate("4.5 Mbit/s (YouTube 1080p)").await.is_err());
    }

    #[test]
    fn test_unknown_startup_bitrate() {
        assert!(SimDevice::new(SimConfig {
            bitrate: "9000".to_string(),
            ..SimConfig::default()
        })
        .is_err());
    }
}
