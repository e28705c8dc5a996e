//! Scriptable in-memory `DeviceApi` for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cam_proto::protocol::{Bitrate, DeviceSnapshot, GlobalState, VideoState};
use tokio::sync::Notify;

use crate::remote::{CallOutcome, DeviceApi, RemoteError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    Fetch,
    StartPreview,
    StopPreview,
    StartRecording,
    StopRecording,
    SetBitrate(String),
}

impl Call {
    fn verb(&self) -> &'static str {
        match self {
            Call::Fetch => "global_state",
            Call::StartPreview => "start_video_preview",
            Call::StopPreview => "stop_video_preview",
            Call::StartRecording => "start_video_recording",
            Call::StopRecording => "stop_video_recording",
            Call::SetBitrate(_) => "set_bitrate",
        }
    }
}

/// `None` in a script slot means "transport failure".
type Scripted<T> = Option<T>;

#[derive(Default)]
struct Script {
    snapshot: Scripted<DeviceSnapshot>,
    outcomes: HashMap<&'static str, Scripted<CallOutcome>>,
    calls: Vec<Call>,
}

#[derive(Clone, Default)]
pub struct FakeDevice {
    script: Arc<Mutex<Script>>,
    /// When set, commands wait for a `notify_one` before answering.
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

pub fn snapshot(state: VideoState) -> DeviceSnapshot {
    DeviceSnapshot::from(GlobalState {
        video_state: state,
        free_space_bytes: 8 * 1024 * 1024 * 1024,
        recorded_videos_size_bytes: 0,
        video_preview_url: Some("http://cam.local:8081/stream".to_string()),
        supported_bitrates: vec![
            Bitrate::new("1", "1 Mbit/s (YouTube 480p)"),
            Bitrate::new("2.5", "2.5 Mbit/s (YouTube 720p)"),
        ],
        bitrate: Some("1".to_string()),
    })
}

impl FakeDevice {
    pub fn new(state: VideoState) -> Self {
        let device = Self::default();
        device.set_snapshot(Some(snapshot(state)));
        device
    }

    pub fn set_snapshot(&self, snapshot: Scripted<DeviceSnapshot>) {
        self.script.lock().unwrap().snapshot = snapshot;
    }

    /// Script the answer of every later call of the same kind.
    pub fn answer(&self, call: Call, outcome: Scripted<CallOutcome>) {
        self.script
            .lock()
            .unwrap()
            .outcomes
            .insert(call.verb(), outcome);
    }

    pub fn hold_commands(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Calls other than snapshot reads.
    pub fn commands(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::Fetch)
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Fetch).count()
    }

    async fn command(&self, call: Call) -> Result<CallOutcome, RemoteError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let verb = call.verb();
        let mut script = self.script.lock().unwrap();
        script.calls.push(call);
        script
            .outcomes
            .get(verb)
            .cloned()
            .unwrap_or(Some(CallOutcome::Ok))
            .ok_or_else(|| unreachable(verb))
    }
}

fn unreachable(verb: &'static str) -> RemoteError {
    RemoteError::Status {
        verb,
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl DeviceApi for FakeDevice {
    async fn fetch_snapshot(&self) -> Result<DeviceSnapshot, RemoteError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Fetch);
        script
            .snapshot
            .clone()
            .ok_or_else(|| unreachable("global_state"))
    }

    async fn start_preview(&self) -> Result<CallOutcome, RemoteError> {
        self.command(Call::StartPreview).await
    }

    async fn stop_preview(&self) -> Result<CallOutcome, RemoteError> {
        self.command(Call::StopPreview).await
    }

    async fn start_recording(&self) -> Result<CallOutcome, RemoteError> {
        self.command(Call::StartRecording).await
    }

    async fn stop_recording(&self) -> Result<CallOutcome, RemoteError> {
        self.command(Call::StopRecording).await
    }

    async fn set_bitrate(&self, name: &str) -> Result<CallOutcome, RemoteError> {
        self.command(Call::SetBitrate(name.to_string())).await
    }

    fn recordings_download_url(&self) -> String {
        "http://cam.local/download_all_recordings".to_string()
    }
}
