//! Shared client state: the last device snapshot, the in-flight action count
//! and the current endpoint.
//!
//! Each value sits in a `watch` channel so the UI can await changes instead
//! of polling, and every writer replaces the value as a whole.

use std::sync::Arc;

use cam_proto::protocol::DeviceSnapshot;
use tokio::sync::watch;

struct Shared {
    snapshot: watch::Sender<DeviceSnapshot>,
    busy: watch::Sender<usize>,
    endpoint: watch::Sender<String>,
}

#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl Store {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let (snapshot, _) = watch::channel(DeviceSnapshot::unknown());
        let (busy, _) = watch::channel(0);
        let (endpoint, _) = watch::channel(endpoint.into());
        Self {
            shared: Arc::new(Shared {
                snapshot,
                busy,
                endpoint,
            }),
        }
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<DeviceSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Replace the snapshot. Readers never see a mix of old and new fields.
    pub fn commit(&self, snapshot: DeviceSnapshot) {
        self.shared.snapshot.send_replace(snapshot);
    }

    /// Back to the Unknown form after a failed read.
    pub fn reset(&self) {
        self.commit(DeviceSnapshot::unknown());
    }

    /// Number of user actions currently in flight.
    pub fn busy(&self) -> usize {
        *self.shared.busy.borrow()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<usize> {
        self.shared.busy.subscribe()
    }

    /// Count one more action in flight until the guard drops.
    pub fn begin_action(&self) -> BusyGuard {
        self.shared.busy.send_modify(|n| *n += 1);
        BusyGuard {
            shared: self.shared.clone(),
        }
    }

    /// Like `begin_action`, but only when nothing else is in flight. The check
    /// and the increment happen under the same lock.
    pub fn try_begin_action(&self) -> Option<BusyGuard> {
        let started = self.shared.busy.send_if_modified(|n| {
            if *n == 0 {
                *n = 1;
                true
            } else {
                false
            }
        });
        started.then(|| BusyGuard {
            shared: self.shared.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        self.shared.endpoint.borrow().clone()
    }

    /// Receiver that always holds the current endpoint; handed to the HTTP
    /// client so requests follow endpoint edits.
    pub fn endpoint_receiver(&self) -> watch::Receiver<String> {
        self.shared.endpoint.subscribe()
    }

    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        self.shared.endpoint.send_replace(endpoint.into());
    }
}

/// Decrements the busy count when dropped, whether the action finished,
/// failed or was cancelled.
pub struct BusyGuard {
    shared: Arc<Shared>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.shared.busy.send_modify(|n| {
            debug_assert!(*n > 0, "busy count underflow");
            *n = n.saturating_sub(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_proto::protocol::VideoState;

    #[test]
    fn test_busy_guard_counts() {
        let store = Store::new("http://h");
        let a = store.begin_action();
        let b = store.begin_action();
        assert_eq!(store.busy(), 2);
        drop(a);
        assert_eq!(store.busy(), 1);
        drop(b);
        assert_eq!(store.busy(), 0);
    }

    #[test]
    fn test_try_begin_is_exclusive() {
        let store = Store::new("http://h");
        let guard = store.try_begin_action().unwrap();
        assert!(store.try_begin_action().is_none());
        assert_eq!(store.busy(), 1);
        drop(guard);
        assert!(store.try_begin_action().is_some());
        assert_eq!(store.busy(), 0);
    }

    #[tokio::test]
    async fn test_busy_released_when_task_is_cancelled() {
        let store = Store::new("http://h");
        let guard = store.begin_action();
        let task = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        assert_eq!(store.busy(), 1);
        task.abort();
        let _ = task.await;
        assert_eq!(store.busy(), 0);
    }

    #[test]
    fn test_commit_and_reset_notify() {
        let store = Store::new("http://h");
        let mut rx = store.subscribe_snapshot();
        assert!(!rx.has_changed().unwrap());

        store.commit(DeviceSnapshot::from_split(
            VideoState::Recording,
            1024,
            String::new(),
        ));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().video_state, VideoState::Recording);

        store.reset();
        assert_eq!(*rx.borrow_and_update(), DeviceSnapshot::unknown());
    }

    #[test]
    fn test_endpoint_receiver_follows_edits() {
        let store = Store::new("http://a");
        let rx = store.endpoint_receiver();
        store.set_endpoint("http://b");
        assert_eq!(*rx.borrow(), "http://b");
        assert_eq!(store.endpoint(), "http://b");
    }
}
