//! Reconciliation loop: keeps the store's snapshot in step with the device.
//!
//! One fetch right away, then a fixed pause measured from the end of each
//! fetch, so a slow device never gets overlapping reads from us. Failures are
//! logged and the loop carries on; the next pass is the retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::remote::{DeviceApi, RemoteError};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Stopped,
    /// Waiting for the next pass.
    Scheduled,
    /// A fetch is in flight.
    Running,
}

/// Read the device once and publish the result. A failed read resets the
/// snapshot to Unknown; the error is returned for callers that report it.
pub async fn refresh<D: DeviceApi>(device: &D, store: &Store) -> Result<(), RemoteError> {
    match device.fetch_snapshot().await {
        Ok(snapshot) => {
            debug!(
                "device state: {} ({} MB free)",
                snapshot.video_state.label(),
                snapshot.free_space_megabytes()
            );
            store.commit(snapshot);
            Ok(())
        }
        Err(e) => {
            warn!("state refresh failed: {}", e);
            store.reset();
            Err(e)
        }
    }
}

pub struct Reconciler<D> {
    device: Arc<D>,
    store: Store,
    interval: Duration,
    phase: Arc<watch::Sender<LoopPhase>>,
    task: Option<JoinHandle<()>>,
}

impl<D: DeviceApi> Reconciler<D> {
    pub fn new(device: Arc<D>, store: Store, interval: Duration) -> Self {
        let (phase, _) = watch::channel(LoopPhase::Stopped);
        Self {
            device,
            store,
            interval,
            phase: Arc::new(phase),
            task: None,
        }
    }

    /// Start polling. Calling it again restarts the loop with a fresh
    /// immediate fetch.
    pub fn start(&mut self) {
        self.stop();
        info!("state sync every {:?}", self.interval);

        let device = self.device.clone();
        let store = self.store.clone();
        let phase = self.phase.clone();
        let interval = self.interval;

        self.task = Some(tokio::spawn(async move {
            loop {
                phase.send_replace(LoopPhase::Running);
                let _ = refresh(device.as_ref(), &store).await;
                phase.send_replace(LoopPhase::Scheduled);
                tokio::time::sleep(interval).await;
            }
        }));
    }

    /// Cancel the pending pass, or the one in flight. Nothing fires afterwards.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.phase.send_replace(LoopPhase::Stopped);
            debug!("state sync stopped");
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> LoopPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<LoopPhase> {
        self.phase.subscribe()
    }
}

impl<D> Drop for Reconciler<D> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
