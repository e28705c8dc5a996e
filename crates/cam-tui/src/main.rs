mod action;
mod app;
mod app_state;
mod component;
mod components;
mod controls;
mod coordinator;
mod download;
mod logging;
mod reconcile;
mod remote;
mod store;
mod theme;
mod widgets;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use cam_proto::config::Config;
use cam_proto::platform;
use cam_proto::state::{JsonFileStore, KeyValueStore, BACKEND_URL_KEY};
use clap::Parser;
use tokio::sync::broadcast;

/// Terminal remote control for a network camera.
#[derive(Parser, Debug)]
#[command(name = "camctl", version)]
struct Args {
    /// Device endpoint, e.g. http://192.168.1.40:8080. Overrides the saved one.
    #[arg(long)]
    endpoint: Option<String>,

    /// Seconds between state refreshes.
    #[arg(long)]
    poll_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("camctl.log");

    let (log_tx, log_rx) = broadcast::channel::<String>(256);
    logging::init(&log_path, log_tx)?;

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("camctl log: {}", log_path.display());
    tracing::info!("camctl starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("config unreadable, using defaults: {:#}", e);
        Config::default()
    });

    // ── Resolve endpoint: flag, then last used, then configured default ─────
    let persisted: Arc<dyn KeyValueStore> =
        Arc::new(JsonFileStore::open(platform::client_state_file()));
    let endpoint = args
        .endpoint
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .or_else(|| persisted.get(BACKEND_URL_KEY))
        .unwrap_or_else(|| config.backend.default_url.clone());
    tracing::info!("device endpoint: {}", endpoint);

    // ── Build sync engine ────────────────────────────────────────────────────
    let store = store::Store::new(endpoint);
    let device = Arc::new(remote::HttpDevice::new(
        store.endpoint_receiver(),
        config.backend.fetch_mode,
        Duration::from_secs(config.backend.request_timeout_secs),
    )?);
    let poll_interval = args
        .poll_interval
        .unwrap_or(config.sync.poll_interval_secs)
        .max(1);
    let reconciler = reconcile::Reconciler::new(
        device.clone(),
        store.clone(),
        Duration::from_secs(poll_interval),
    );
    let coordinator = coordinator::Coordinator::new(device, store, persisted);
    let downloader = download::Downloader::new(config.paths.downloads_dir.clone());

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let app = app::App::new(coordinator, reconciler, downloader, log_path);
    let result = app.run(log_rx).await;
    if let Err(e) = &result {
        tracing::error!("TUI exited with error: {:#}", e);
    }
    result
}
