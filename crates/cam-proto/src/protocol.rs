use serde::{Deserialize, Serialize};

/// Success marker returned by every state-changing device call.
pub const RESULT_OK: &str = "ok";

/// Recorder state as reported by the device.
///
/// `Unknown` never travels on the wire; it is the client's value for "no
/// successful read yet" or "the last read failed".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum VideoState {
    #[default]
    #[serde(skip)]
    Unknown,
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "previewing")]
    Previewing,
    #[serde(rename = "recording")]
    Recording,
    /// The device refuses to record until space is freed.
    #[serde(rename = "insufficient storage")]
    InsufficientStorage,
}

impl VideoState {
    pub fn is_known(self) -> bool {
        self != VideoState::Unknown
    }

    /// Lowercase label, matching the device's own wording.
    pub fn label(self) -> &'static str {
        match self {
            VideoState::Unknown => "unknown",
            VideoState::Idle => "idle",
            VideoState::Previewing => "previewing",
            VideoState::Recording => "recording",
            VideoState::InsufficientStorage => "insufficient storage",
        }
    }
}

/// One entry of the device's bitrate menu. `name` is the stable identifier
/// sent back in `set_bitrate`; `description` is only for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bitrate {
    pub name: String,
    pub description: String,
}

impl Bitrate {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Every device response body: `{"result": T}` or `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Envelope<T> {
    Result { result: T },
    Error { error: String },
}

impl<T> Envelope<T> {
    pub fn ok(result: T) -> Self {
        Envelope::Result { result }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error {
            error: message.into(),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Envelope::Result { result } => Ok(result),
            Envelope::Error { error } => Err(error),
        }
    }
}

/// Payload of `GET /global_state`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalState {
    pub video_state: VideoState,
    pub free_space_bytes: u64,
    #[serde(default)]
    pub recorded_videos_size_bytes: u64,
    /// Older devices send `null` when no preview is configured.
    #[serde(default)]
    pub video_preview_url: Option<String>,
    #[serde(default)]
    pub supported_bitrates: Vec<Bitrate>,
    #[serde(default)]
    pub bitrate: Option<String>,
}

/// Last known full state of the device as seen by this client.
///
/// Always replaced as a whole. `Default` is the Unknown form shown before the
/// first read and after any failed read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSnapshot {
    pub video_state: VideoState,
    pub free_space_bytes: u64,
    pub recorded_bytes: u64,
    pub preview_url: String,
    pub supported_bitrates: Vec<Bitrate>,
    /// Always names an entry of `supported_bitrates`.
    selected_bitrate: Option<String>,
}

impl DeviceSnapshot {
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Snapshot assembled from the legacy per-field endpoints, which carry no
    /// bitrate information.
    pub fn from_split(video_state: VideoState, free_space_bytes: u64, preview_url: String) -> Self {
        Self {
            video_state,
            free_space_bytes,
            preview_url,
            ..Self::default()
        }
    }

    pub fn with_bitrates(mut self, bitrates: Vec<Bitrate>, selected: Option<String>) -> Self {
        self.selected_bitrate = selected.filter(|name| bitrates.iter().any(|b| &b.name == name));
        self.supported_bitrates = bitrates;
        self
    }

    pub fn is_known(&self) -> bool {
        self.video_state.is_known()
    }

    pub fn free_space_megabytes(&self) -> u64 {
        bytes_to_megabytes(self.free_space_bytes)
    }

    pub fn recorded_megabytes(&self) -> u64 {
        bytes_to_megabytes(self.recorded_bytes)
    }

    pub fn selected_bitrate(&self) -> Option<&Bitrate> {
        let name = self.selected_bitrate.as_deref()?;
        self.supported_bitrates.iter().find(|b| b.name == name)
    }

    /// Map a displayed description back to its menu entry.
    pub fn bitrate_by_description(&self, description: &str) -> Option<&Bitrate> {
        self.supported_bitrates
            .iter()
            .find(|b| b.description == description)
    }
}

impl From<GlobalState> for DeviceSnapshot {
    fn from(state: GlobalState) -> Self {
        Self {
            video_state: state.video_state,
            free_space_bytes: state.free_space_bytes,
            recorded_bytes: state.recorded_videos_size_bytes,
            preview_url: state.video_preview_url.unwrap_or_default(),
            ..Self::default()
        }
        .with_bitrates(state.supported_bitrates, state.bitrate)
    }
}

fn bytes_to_megabytes(bytes: u64) -> u64 {
    (bytes as f64 / 1024.0 / 1024.0).round() as u64
}
