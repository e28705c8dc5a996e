//! Action Coordinator: turns a user intent into the device calls it implies.
//!
//! Every action holds a `BusyGuard` from the moment it is accepted until it
//! returns, so the busy count is right whatever happens in between. Calls of
//! one action run strictly in order. Errors stop at this boundary: they are
//! logged and reported, never propagated to the UI loop.

use std::sync::Arc;

use cam_proto::protocol::{DeviceSnapshot, VideoState};
use cam_proto::state::{KeyValueStore, BACKEND_URL_KEY};
use tracing::{info, warn};

use crate::controls::Controls;
use crate::reconcile::refresh;
use crate::remote::{CallOutcome, DeviceApi, RemoteError};
use crate::store::{BusyGuard, Store};

/// A discrete user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    TogglePreview,
    ToggleRecording,
    /// Carries the description the user picked, not the bitrate name.
    ChangeBitrate(String),
    ChangeEndpoint(String),
    DownloadRecordings,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::TogglePreview => "Toggle preview",
            Intent::ToggleRecording => "Toggle recording",
            Intent::ChangeBitrate(_) => "Change bitrate",
            Intent::ChangeEndpoint(_) => "Change endpoint",
            Intent::DownloadRecordings => "Download recordings",
        }
    }
}

/// What became of an intent, for the UI to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReport {
    /// The device accepted every call.
    Applied,
    /// The device answered but refused; nothing was refreshed.
    Rejected(String),
    /// A call never got a usable answer.
    Failed(String),
    /// Refused before any call: control disabled or another action in flight.
    Disabled,
    /// The recordings archive is at this URL.
    Opened(String),
}

pub struct Coordinator<D> {
    device: Arc<D>,
    store: Store,
    persisted: Arc<dyn KeyValueStore>,
}

impl<D> Clone for Coordinator<D> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            store: self.store.clone(),
            persisted: self.persisted.clone(),
        }
    }
}

impl<D: DeviceApi> Coordinator<D> {
    pub fn new(device: Arc<D>, store: Store, persisted: Arc<dyn KeyValueStore>) -> Self {
        Self {
            device,
            store,
            persisted,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Gate check and guard acquisition, synchronously, so the caller holds
    /// the guard before any asynchronous work is spawned.
    pub fn try_begin(&self, intent: &Intent) -> Result<BusyGuard, ActionReport> {
        if let Intent::ChangeEndpoint(_) = intent {
            return Ok(self.store.begin_action());
        }
        let controls = Controls::derive(self.store.snapshot().video_state, self.store.busy(), false);
        if !controls.allows(intent) {
            return Err(ActionReport::Disabled);
        }
        self.store.try_begin_action().ok_or(ActionReport::Disabled)
    }

    /// Run an accepted intent. The guard is released when this returns or is
    /// dropped.
    ///
    /// The snapshot is read once here and every decision is made on it. A
    /// poll may have replaced it since `try_begin`, so enablement is checked
    /// again (our own guard aside).
    pub async fn perform(&self, intent: Intent, _busy: BusyGuard) -> ActionReport {
        let snapshot = self.store.snapshot();
        if !matches!(intent, Intent::ChangeEndpoint(_))
            && !Controls::derive(snapshot.video_state, 0, false).allows(&intent)
        {
            info!(
                "{} dropped: device now {}",
                intent.label(),
                snapshot.video_state.label()
            );
            return ActionReport::Disabled;
        }

        info!("action: {}", intent.label());
        match intent {
            Intent::TogglePreview => self.toggle_preview(snapshot.video_state).await,
            Intent::ToggleRecording => self.toggle_recording(snapshot.video_state).await,
            Intent::ChangeBitrate(description) => self.change_bitrate(&snapshot, &description).await,
            Intent::ChangeEndpoint(url) => self.change_endpoint(&url).await,
            Intent::DownloadRecordings => ActionReport::Opened(self.device.recordings_download_url()),
        }
    }

    /// `try_begin` followed by `perform`.
    #[cfg(test)]
    pub async fn handle(&self, intent: Intent) -> ActionReport {
        match self.try_begin(&intent) {
            Ok(guard) => self.perform(intent, guard).await,
            Err(report) => {
                info!("{} ignored: disabled", intent.label());
                report
            }
        }
    }

    async fn toggle_preview(&self, state: VideoState) -> ActionReport {
        let result = if state == VideoState::Previewing {
            self.device.stop_preview().await
        } else {
            self.device.start_preview().await
        };
        self.finish("toggle preview", result).await
    }

    async fn toggle_recording(&self, state: VideoState) -> ActionReport {
        match state {
            VideoState::Recording => {
                let result = self.device.stop_recording().await;
                self.finish("stop recording", result).await
            }
            _ => {
                if state == VideoState::Previewing {
                    match self.device.stop_preview().await {
                        Ok(CallOutcome::Ok) => {}
                        other => return self.finish("stop preview before recording", other).await,
                    }
                }
                let result = self.device.start_recording().await;
                self.finish("start recording", result).await
            }
        }
    }

    async fn change_bitrate(&self, snapshot: &DeviceSnapshot, description: &str) -> ActionReport {
        let name = match snapshot.bitrate_by_description(description) {
            Some(bitrate) => bitrate.name.clone(),
            None => {
                warn!("no bitrate described as {:?}", description);
                return ActionReport::Rejected(format!("unknown bitrate {:?}", description));
            }
        };
        let result = self.device.set_bitrate(&name).await;
        self.finish("set bitrate", result).await
    }

    async fn change_endpoint(&self, url: &str) -> ActionReport {
        let url = url.trim();
        if let Err(e) = self.persisted.set(BACKEND_URL_KEY, url) {
            warn!("endpoint not saved: {}", e);
        }
        info!("endpoint -> {}", url);
        self.store.set_endpoint(url);
        match refresh(self.device.as_ref(), &self.store).await {
            Ok(()) => ActionReport::Applied,
            Err(e) => ActionReport::Failed(e.to_string()),
        }
    }

    async fn finish(&self, what: &str, result: Result<CallOutcome, RemoteError>) -> ActionReport {
        match result {
            Ok(CallOutcome::Ok) => {
                // A failed refresh already reset the snapshot and logged.
                let _ = refresh(self.device.as_ref(), &self.store).await;
                ActionReport::Applied
            }
            Ok(CallOutcome::Rejected(reason)) => {
                warn!("{}: device refused: {}", what, reason);
                ActionReport::Rejected(reason)
            }
            Err(e) => {
                warn!("{}: {}", what, e);
                ActionReport::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{snapshot, Call, FakeDevice};
    use crate::reconcile::Reconciler;
    use std::time::Duration;
    use cam_proto::protocol::Bitrate;
    use cam_proto::state::MemoryStore;

    struct Harness {
        device: Arc<FakeDevice>,
        store: Store,
        persisted: Arc<MemoryStore>,
        coordinator: Coordinator<FakeDevice>,
    }

    /// Coordinator whose store already holds a snapshot in `state`.
    fn harness(state: VideoState) -> Harness {
        let device = Arc::new(FakeDevice::new(state));
        let store = Store::new("http://cam.local");
        store.commit(snapshot(state));
        let persisted = Arc::new(MemoryStore::new());
        let coordinator = Coordinator::new(device.clone(), store.clone(), persisted.clone());
        Harness {
            device,
            store,
            persisted,
            coordinator,
        }
    }

    #[tokio::test]
    async fn test_preview_from_idle_refreshes_on_ok() {
        let h = harness(VideoState::Idle);
        h.device.set_snapshot(Some(snapshot(VideoState::Previewing)));

        let report = h.coordinator.handle(Intent::TogglePreview).await;
        assert_eq!(report, ActionReport::Applied);
        assert_eq!(h.device.calls(), vec![Call::StartPreview, Call::Fetch]);
        assert_eq!(h.store.snapshot().video_state, VideoState::Previewing);
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_preview_soft_failure_skips_refresh() {
        let h = harness(VideoState::Idle);
        h.device
            .answer(Call::StartPreview, Some(CallOutcome::Rejected("error".into())));

        let report = h.coordinator.handle(Intent::TogglePreview).await;
        assert_eq!(report, ActionReport::Rejected("error".into()));
        assert_eq!(h.device.calls(), vec![Call::StartPreview]);
        assert_eq!(h.store.snapshot(), snapshot(VideoState::Idle));
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_preview_toggle_picks_one_call() {
        for (state, expected) in [
            (VideoState::Previewing, Call::StopPreview),
            (VideoState::Idle, Call::StartPreview),
            (VideoState::InsufficientStorage, Call::StartPreview),
        ] {
            let h = harness(state);
            h.coordinator.handle(Intent::TogglePreview).await;
            assert_eq!(h.device.commands(), vec![expected]);
        }
    }

    #[tokio::test]
    async fn test_record_from_preview_stops_preview_first() {
        let h = harness(VideoState::Previewing);
        let report = h.coordinator.handle(Intent::ToggleRecording).await;
        assert_eq!(report, ActionReport::Applied);
        assert_eq!(
            h.device.calls(),
            vec![Call::StopPreview, Call::StartRecording, Call::Fetch]
        );
    }

    #[tokio::test]
    async fn test_record_aborts_when_stop_preview_refused() {
        let h = harness(VideoState::Previewing);
        h.device
            .answer(Call::StopPreview, Some(CallOutcome::Rejected("busy".into())));
        let report = h.coordinator.handle(Intent::ToggleRecording).await;
        assert_eq!(report, ActionReport::Rejected("busy".into()));
        assert_eq!(h.device.calls(), vec![Call::StopPreview]);

        let h = harness(VideoState::Previewing);
        h.device.answer(Call::StopPreview, None);
        let report = h.coordinator.handle(Intent::ToggleRecording).await;
        assert!(matches!(report, ActionReport::Failed(_)));
        assert_eq!(h.device.calls(), vec![Call::StopPreview]);
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_stop_recording() {
        let h = harness(VideoState::Recording);
        h.coordinator.handle(Intent::ToggleRecording).await;
        assert_eq!(h.device.commands(), vec![Call::StopRecording]);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_snapshot() {
        let h = harness(VideoState::Idle);
        h.device.answer(Call::StartRecording, None);
        let report = h.coordinator.handle(Intent::ToggleRecording).await;
        assert!(matches!(report, ActionReport::Failed(_)));
        assert_eq!(h.store.snapshot(), snapshot(VideoState::Idle));
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_bitrate_resolved_from_description() {
        let h = harness(VideoState::Idle);
        let report = h
            .coordinator
            .handle(Intent::ChangeBitrate("2.5 Mbit/s (YouTube 720p)".into()))
            .await;
        assert_eq!(report, ActionReport::Applied);
        assert_eq!(h.device.commands(), vec![Call::SetBitrate("2.5".into())]);
    }

    #[tokio::test]
    async fn test_unknown_bitrate_description_makes_no_call() {
        let h = harness(VideoState::Idle);
        let report = h.coordinator.handle(Intent::ChangeBitrate("2.5".into())).await;
        assert!(matches!(report, ActionReport::Rejected(_)));
        assert!(h.device.calls().is_empty());
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_single_entry_bitrate_scenario() {
        let h = harness(VideoState::Idle);
        let low = DeviceSnapshot::from_split(VideoState::Idle, 2_097_152, String::new())
            .with_bitrates(vec![Bitrate::new("low", "Low")], Some("low".to_string()));
        h.store.commit(low.clone());
        h.device.set_snapshot(Some(low));

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.free_space_megabytes(), 2);
        assert_eq!(snapshot.selected_bitrate().unwrap().description, "Low");
        let controls = Controls::derive(snapshot.video_state, h.store.busy(), false);
        assert!(controls.preview && controls.recording);

        h.coordinator.handle(Intent::ChangeBitrate("Low".into())).await;
        assert_eq!(h.device.commands(), vec![Call::SetBitrate("low".into())]);
    }

    #[tokio::test]
    async fn test_disabled_while_recording_or_unknown() {
        let h = harness(VideoState::Recording);
        for intent in [
            Intent::TogglePreview,
            Intent::ChangeBitrate("1 Mbit/s (YouTube 480p)".into()),
            Intent::DownloadRecordings,
        ] {
            assert_eq!(h.coordinator.handle(intent).await, ActionReport::Disabled);
        }

        h.store.reset();
        assert_eq!(
            h.coordinator.handle(Intent::ToggleRecording).await,
            ActionReport::Disabled
        );
        assert!(h.device.calls().is_empty());
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_download_hands_out_url() {
        let h = harness(VideoState::Idle);
        assert_eq!(
            h.coordinator.handle(Intent::DownloadRecordings).await,
            ActionReport::Opened("http://cam.local/download_all_recordings".into())
        );
        assert!(h.device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_change_persists_then_refreshes() {
        let h = harness(VideoState::Recording);
        let report = h
            .coordinator
            .handle(Intent::ChangeEndpoint(" http://10.0.0.7:5000 ".into()))
            .await;
        assert_eq!(report, ActionReport::Applied);
        assert_eq!(
            h.persisted.get(BACKEND_URL_KEY).as_deref(),
            Some("http://10.0.0.7:5000")
        );
        assert_eq!(h.store.endpoint(), "http://10.0.0.7:5000");
        assert_eq!(h.device.calls(), vec![Call::Fetch]);

        h.device.set_snapshot(None);
        let report = h
            .coordinator
            .handle(Intent::ChangeEndpoint("http://nowhere".into()))
            .await;
        assert!(matches!(report, ActionReport::Failed(_)));
        assert!(!h.store.snapshot().is_known());
    }

    #[tokio::test]
    async fn test_second_action_refused_while_one_in_flight() {
        let h = harness(VideoState::Idle);
        let release = h.device.hold_commands();

        let guard = h.coordinator.try_begin(&Intent::TogglePreview).unwrap();
        let coordinator = h.coordinator.clone();
        let task = tokio::spawn(async move { coordinator.perform(Intent::TogglePreview, guard).await });

        assert_eq!(h.store.busy(), 1);
        assert_eq!(
            h.coordinator.handle(Intent::ToggleRecording).await,
            ActionReport::Disabled
        );
        // Endpoint edits are never gated.
        let endpoint_guard = h
            .coordinator
            .try_begin(&Intent::ChangeEndpoint("http://b".into()))
            .unwrap();
        assert_eq!(h.store.busy(), 2);
        drop(endpoint_guard);

        release.notify_one();
        assert_eq!(task.await.unwrap(), ActionReport::Applied);
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_busy_released_when_action_is_cancelled() {
        let h = harness(VideoState::Idle);
        let _release = h.device.hold_commands();
        let guard = h.coordinator.try_begin(&Intent::TogglePreview).unwrap();
        let coordinator = h.coordinator.clone();
        let task = tokio::spawn(async move { coordinator.perform(Intent::TogglePreview, guard).await });
        tokio::task::yield_now().await;

        task.abort();
        let _ = task.await;
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_accepted_action_dropped_when_state_turns_unknown() {
        let h = harness(VideoState::Idle);
        let guard = h.coordinator.try_begin(&Intent::ToggleRecording).unwrap();
        // A poll fails between acceptance and execution.
        h.store.reset();

        let report = h.coordinator.perform(Intent::ToggleRecording, guard).await;
        assert_eq!(report, ActionReport::Disabled);
        assert!(h.device.calls().is_empty());
        assert_eq!(h.store.busy(), 0);
    }

    #[tokio::test]
    async fn test_accepted_preview_dropped_when_recording_started_elsewhere() {
        let h = harness(VideoState::Idle);
        let guard = h.coordinator.try_begin(&Intent::TogglePreview).unwrap();
        h.store.commit(snapshot(VideoState::Recording));

        let report = h.coordinator.perform(Intent::TogglePreview, guard).await;
        assert_eq!(report, ActionReport::Disabled);
        assert!(h.device.commands().is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_change_runs_whatever_the_state() {
        let h = harness(VideoState::Idle);
        let guard = h
            .coordinator
            .try_begin(&Intent::ChangeEndpoint("http://b".into()))
            .unwrap();
        h.store.reset();
        let report = h
            .coordinator
            .perform(Intent::ChangeEndpoint("http://b".into()), guard)
            .await;
        assert_eq!(report, ActionReport::Applied);
        assert_eq!(h.device.calls(), vec![Call::Fetch]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_settles_with_polling_interleaved() {
        let h = harness(VideoState::Idle);
        let mut reconciler =
            Reconciler::new(h.device.clone(), h.store.clone(), Duration::from_secs(10));
        reconciler.start();
        let release = h.device.hold_commands();

        let guard = h.coordinator.try_begin(&Intent::TogglePreview).unwrap();
        let coordinator = h.coordinator.clone();
        let task = tokio::spawn(async move { coordinator.perform(Intent::TogglePreview, guard).await });

        // Polls keep landing while the action waits on the device.
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(h.device.fetch_count(), 3);
        assert_eq!(h.store.busy(), 1);

        // So does a failed one.
        h.device.set_snapshot(None);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!h.store.snapshot().is_known());
        assert_eq!(h.store.busy(), 1);

        h.device.set_snapshot(Some(snapshot(VideoState::Previewing)));
        release.notify_one();
        assert_eq!(task.await.unwrap(), ActionReport::Applied);
        assert_eq!(h.store.busy(), 0);
        assert_eq!(h.store.snapshot().video_state, VideoState::Previewing);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.store.busy(), 0);
        reconciler.stop();
    }
}
