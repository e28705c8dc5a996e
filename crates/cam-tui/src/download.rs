//! Recordings download
//!
//! Streams `GET /download_all_recordings` to a file in the downloads
//! directory and reports progress over a channel. Only one download runs at a
//! time; it does not count as a busy action.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use futures_util::StreamExt;
use reqwest::header::CONTENT_DISPOSITION;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Minimum bytes between two progress reports.
const PROGRESS_STEP: u64 = 1024 * 1024;

/// Numbered variants tried before giving up on a file name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    Idle,
    Downloading { received: u64, total: Option<u64> },
    Finished(PathBuf),
    Failed(String),
}

impl DownloadStatus {
    /// 0.0 - 1.0 when the size is known.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            DownloadStatus::Downloading {
                received,
                total: Some(total),
            } if *total > 0 => Some((*received as f64 / *total as f64).min(1.0)),
            _ => None,
        }
    }
}

pub struct Downloader {
    client: reqwest::Client,
    dir: PathBuf,
    status: DownloadStatus,
}

impl Downloader {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            dir,
            status: DownloadStatus::Idle,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn status(&self) -> &DownloadStatus {
        &self.status
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, DownloadStatus::Downloading { .. })
    }

    /// Spawn the transfer. Progress and the final result arrive on `tx`.
    pub fn start(&mut self, url: String, tx: mpsc::Sender<DownloadStatus>) -> Result<(), String> {
        if self.is_active() {
            return Err("A download is already running".to_string());
        }
        info!("downloading {} into {:?}", url, self.dir);
        self.status = DownloadStatus::Downloading {
            received: 0,
            total: None,
        };

        let client = self.client.clone();
        let dir = self.dir.clone();
        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let result = fetch_to_dir(&client, &url, &dir, |received, total| {
                let _ = progress_tx.try_send(DownloadStatus::Downloading { received, total });
            })
            .await;

            let status = match result {
                Ok(path) => {
                    info!("download complete: {:?}", path);
                    DownloadStatus::Finished(path)
                }
                Err(e) => {
                    error!("download failed: {:#}", e);
                    DownloadStatus::Failed(format!("{:#}", e))
                }
            };
            let _ = tx.send(status).await;
        });
        Ok(())
    }

    /// Apply an update received from the download task.
    pub fn update(&mut self, status: DownloadStatus) {
        // A late progress message must not overwrite the final state.
        if matches!(status, DownloadStatus::Downloading { .. }) && !self.is_active() {
            return;
        }
        self.status = status;
    }
}

/// Stream `url` into `dir`, returning the written path.
pub async fn fetch_to_dir(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    mut progress: impl FnMut(u64, Option<u64>),
) -> anyhow::Result<PathBuf> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;
    if !response.status().is_success() {
        bail!("Device answered HTTP {}", response.status());
    }

    let file_name = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
        .unwrap_or_else(default_file_name);
    let total = response.content_length();

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {:?}", dir))?;
    let (path, mut file) = create_unique(dir, &file_name).await?;

    let mut received = 0u64;
    let mut reported = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Download interrupted")?;
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        if received - reported >= PROGRESS_STEP {
            progress(received, total);
            reported = received;
        }
    }
    file.flush().await?;
    progress(received, total);
    Ok(path)
}

/// Create `name` in `dir` without touching an existing file: `a.zip` becomes
/// `a-1.zip`, `a-2.zip`, ... when taken.
async fn create_unique(dir: &Path, name: &str) -> anyhow::Result<(PathBuf, tokio::fs::File)> {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = match (n, ext) {
            (0, _) => name.to_string(),
            (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
            (n, None) => format!("{}-{}", stem, n),
        };
        let path = dir.join(candidate);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).with_context(|| format!("Failed to create {:?}", path)),
        }
    }
    bail!("No free file name for {} in {:?}", name, dir)
}

/// `filename=` from a Content-Disposition value, reduced to a bare name.
fn disposition_filename(value: &str) -> Option<String> {
    let raw = value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?;
    let name = raw.trim_matches('"');
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

fn default_file_name() -> String {
    format!(
        "recordings-{}.zip",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    )
}
