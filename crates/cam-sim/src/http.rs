use axum::{
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use cam_proto::protocol::{Envelope, GlobalState, VideoState, RESULT_OK};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{info, warn};

use crate::device::{CommandResult, SimDevice};

type ApiResult<T> = Json<Envelope<T>>;

#[derive(Deserialize)]
struct BitrateQuery {
    bitrate: Option<String>,
}

/// Routes of the device API, all plain GETs.
pub fn router(device: SimDevice) -> Router {
    Router::new()
        .route("/global_state", get(global_state))
        .route("/video_state", get(video_state))
        .route("/free_space_bytes", get(free_space_bytes))
        .route("/video_preview_url", get(video_preview_url))
        .route("/start_video_preview", get(start_video_preview))
        .route("/stop_video_preview", get(stop_video_preview))
        .route("/start_video_recording", get(start_video_recording))
        .route("/stop_video_recording", get(stop_video_recording))
        .route("/set_bitrate", get(set_bitrate))
        .route("/download_all_recordings", get(download_all_recordings))
        .route("/delete_recorded_videos", get(delete_recorded_videos))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("max-age=0"),
                )),
        )
        .with_state(device)
}

/// Serve the device API on an already-bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, device: SimDevice) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("device API listening on http://{}", addr);
    }
    axum::serve(listener, router(device)).await
}

fn command_reply(name: &str, result: CommandResult) -> ApiResult<&'static str> {
    match result {
        Ok(()) => {
            info!("{}: ok", name);
            Json(Envelope::ok(RESULT_OK))
        }
        Err(reason) => {
            warn!("{}: refused: {}", name, reason);
            Json(Envelope::error(reason))
        }
    }
}

async fn global_state(State(device): State<SimDevice>) -> ApiResult<GlobalState> {
    Json(Envelope::ok(device.global_state().await))
}

async fn video_state(State(device): State<SimDevice>) -> ApiResult<VideoState> {
    Json(Envelope::ok(device.video_state().await))
}

async fn free_space_bytes(State(device): State<SimDevice>) -> ApiResult<u64> {
    Json(Envelope::ok(device.free_space_bytes().await))
}

async fn video_preview_url(State(device): State<SimDevice>) -> ApiResult<String> {
    Json(Envelope::ok(device.preview_url().await))
}

async fn start_video_preview(State(device): State<SimDevice>) -> ApiResult<&'static str> {
    command_reply("start_video_preview", device.start_preview().await)
}

async fn stop_video_preview(State(device): State<SimDevice>) -> ApiResult<&'static str> {
    command_reply("stop_video_preview", device.stop_preview().await)
}

async fn start_video_recording(State(device): State<SimDevice>) -> ApiResult<&'static str> {
    command_reply("start_video_recording", device.start_recording().await)
}

async fn stop_video_recording(State(device): State<SimDevice>) -> ApiResult<&'static str> {
    command_reply("stop_video_recording", device.stop_recording().await)
}

async fn set_bitrate(
    State(device): State<SimDevice>,
    Query(query): Query<BitrateQuery>,
) -> ApiResult<&'static str> {
    let result = match query.bitrate.as_deref() {
        Some(name) => device.set_bitrate(name).await,
        None => Err("missing bitrate parameter".to_string()),
    };
    command_reply("set_bitrate", result)
}

async fn delete_recorded_videos(State(device): State<SimDevice>) -> ApiResult<&'static str> {
    command_reply("delete_recorded_videos", device.delete_recordings().await)
}

/// The real device zips the recordings folder; the simulator has no video
/// files, so it serves a plain-text manifest with the same disposition.
async fn download_all_recordings(State(device): State<SimDevice>) -> impl IntoResponse {
    let recordings = device.recordings().await;
    info!("download_all_recordings: {} recordings", recordings.len());
    let manifest: String = recordings
        .iter()
        .map(|r| format!("{}\t{}\n", r.file_name, r.size_bytes))
        .collect();
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=recordings.txt",
            ),
        ],
        manifest,
    )
}
