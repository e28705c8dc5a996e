//! Remote State Client — typed access to the capture device's HTTP API.
//!
//! Every reply is an envelope, `{"result": T}` or `{"error": "..."}`.
//! Anything that keeps us from reading a well-formed envelope (connection
//! refused, timeout, non-2xx, unparsable body) becomes a `RemoteError`.
//! A well-formed reply to a command that is not `"ok"` is a soft failure and
//! comes back as `CallOutcome::Rejected`, not as an error.
//!
//! One attempt per call; the reconciliation loop is the only retry.

use std::future::Future;
use std::time::Duration;

use cam_proto::config::FetchMode;
use cam_proto::protocol::{DeviceSnapshot, Envelope, GlobalState, VideoState, RESULT_OK};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("{verb}: device unreachable: {source}")]
    Transport {
        verb: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{verb}: device answered HTTP {status}")]
    Status {
        verb: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{verb}: malformed reply: {reason}")]
    Malformed { verb: &'static str, reason: String },
}

/// Result of a state-changing call that reached the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Ok,
    /// The device answered but did not apply the change.
    Rejected(String),
}

/// Operations the control panel needs from a device.
pub trait DeviceApi: Send + Sync + 'static {
    /// One logical read of the whole device state. Never partially applied:
    /// either every field was read or the call fails.
    fn fetch_snapshot(&self) -> impl Future<Output = Result<DeviceSnapshot, RemoteError>> + Send;

    fn start_preview(&self) -> impl Future<Output = Result<CallOutcome, RemoteError>> + Send;

    fn stop_preview(&self) -> impl Future<Output = Result<CallOutcome, RemoteError>> + Send;

    fn start_recording(&self) -> impl Future<Output = Result<CallOutcome, RemoteError>> + Send;

    fn stop_recording(&self) -> impl Future<Output = Result<CallOutcome, RemoteError>> + Send;

    /// `name` is the stable bitrate identifier, never its description.
    fn set_bitrate(&self, name: &str)
        -> impl Future<Output = Result<CallOutcome, RemoteError>> + Send;

    /// Where the recordings archive can be fetched. No network access.
    fn recordings_download_url(&self) -> String;
}

/// `{endpoint}/{verb}`, tolerating a trailing slash on the endpoint.
pub fn verb_url(endpoint: &str, verb: &str) -> String {
    format!("{}/{}", endpoint.trim().trim_end_matches('/'), verb)
}

/// `DeviceApi` over HTTP. Follows the current endpoint of the `Store`, so an
/// endpoint edit takes effect on the very next request.
pub struct HttpDevice {
    client: reqwest::Client,
    endpoint: watch::Receiver<String>,
    fetch_mode: FetchMode,
}

impl HttpDevice {
    pub fn new(
        endpoint: watch::Receiver<String>,
        fetch_mode: FetchMode,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            fetch_mode,
        })
    }

    fn url(&self, verb: &str) -> String {
        verb_url(&self.endpoint.borrow(), verb)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        verb: &'static str,
        query: &[(&str, &str)],
    ) -> Result<Envelope<T>, RemoteError> {
        let url = self.url(verb);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| RemoteError::Transport { verb, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status { verb, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| RemoteError::Transport { verb, source })?;

        serde_json::from_slice(&body).map_err(|e| RemoteError::Malformed {
            verb,
            reason: e.to_string(),
        })
    }

    /// A read must carry a `result`; an `{"error"}` reply is as useless as
    /// garbage here.
    async fn read<T: DeserializeOwned>(&self, verb: &'static str) -> Result<T, RemoteError> {
        self.get::<T>(verb, &[])
            .await?
            .into_result()
            .map_err(|error| RemoteError::Malformed {
                verb,
                reason: format!("device error: {}", error),
            })
    }

    async fn command(
        &self,
        verb: &'static str,
        query: &[(&str, &str)],
    ) -> Result<CallOutcome, RemoteError> {
        let outcome = match self.get::<serde_json::Value>(verb, query).await? {
            Envelope::Result { result } if result == RESULT_OK => CallOutcome::Ok,
            Envelope::Result { result } => CallOutcome::Rejected(match result {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            Envelope::Error { error } => CallOutcome::Rejected(error),
        };
        debug!("{} -> {:?}", verb, outcome);
        Ok(outcome)
    }
}

impl DeviceApi for HttpDevice {
    async fn fetch_snapshot(&self) -> Result<DeviceSnapshot, RemoteError> {
        match self.fetch_mode {
            FetchMode::Consolidated => {
                let state = self.read::<GlobalState>("global_state").await?;
                Ok(DeviceSnapshot::from(state))
            }
            FetchMode::Split => {
                let video_state = self.read::<VideoState>("video_state").await?;
                let free_space_bytes = self.read::<u64>("free_space_bytes").await?;
                let preview_url = self.read::<Option<String>>("video_preview_url").await?;
                Ok(DeviceSnapshot::from_split(
                    video_state,
                    free_space_bytes,
                    preview_url.unwrap_or_default(),
                ))
            }
        }
    }

    async fn start_preview(&self) -> Result<CallOutcome, RemoteError> {
        self.command("start_video_preview", &[]).await
    }

    async fn stop_preview(&self) -> Result<CallOutcome, RemoteError> {
        self.command("stop_video_preview", &[]).await
    }

    async fn start_recording(&self) -> Result<CallOutcome, RemoteError> {
        self.command("start_video_recording", &[]).await
    }

    async fn stop_recording(&self) -> Result<CallOutcome, RemoteError> {
        self.command("stop_video_recording", &[]).await
    }

    async fn set_bitrate(&self, name: &str) -> Result<CallOutcome, RemoteError> {
        self.command("set_bitrate", &[("bitrate", name)]).await
    }

    fn recordings_download_url(&self) -> String {
        self.url("download_all_recordings")
    }
}
