//! The single-owner loop applying watch events to the cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sift_system::ShutdownHandle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{KubeConfig, NamespaceObject, PodCache, PodObject};

/// A typed resource event delivered by the external informer layer.
///
/// The informer pushes events into a bounded channel instead of invoking
/// callbacks; the single consumer loop preserves per-key ordering while the
/// event source runs on its own task. Duplicate and out-of-order delivery
/// is tolerated by the cache's stale-write and stale-delete guards.
#[derive(Clone, Debug)]
pub enum WatchEvent {
    /// A pod appeared.
    PodAdded(PodObject),
    /// A pod changed.
    PodUpdated(PodObject),
    /// A pod was deleted.
    PodDeleted(PodObject),
    /// A namespace appeared.
    NamespaceAdded(NamespaceObject),
    /// A namespace changed.
    NamespaceUpdated(NamespaceObject),
    /// A namespace was deleted.
    NamespaceDeleted(NamespaceObject),
}

/// Owns the cache's event application and eviction schedule.
///
/// The service is constructed explicitly and started with
/// [`spawn`](Self::spawn); stopping goes through the shutdown signal. The
/// loop exits within one sweep interval of the signal.
pub struct WatchService {
    cache: Arc<PodCache>,
    sweep_interval: Duration,
    grace_period: chrono::Duration,
    queue_size: usize,
}

impl WatchService {
    /// Creates the service for the given cache.
    pub fn new(cache: Arc<PodCache>, config: &KubeConfig) -> Self {
        Self {
            cache,
            sweep_interval: Duration::from_secs(config.sweep_interval.max(1)),
            grace_period: chrono::Duration::seconds(config.grace_period as i64),
            queue_size: config.queue_size,
        }
    }

    /// Spawns the event loop.
    ///
    /// Returns the sender the informer layer pushes events into, and the
    /// join handle of the loop.
    pub fn spawn(self, mut shutdown: ShutdownHandle) -> (mpsc::Sender<WatchEvent>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(self.queue_size.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.sweep_interval);
            sift_log::info!("pod watch started");

            loop {
                tokio::select! {
                    // Prioritize the sweep over event intake so a flood of
                    // events cannot starve eviction. Shutdown can be last.
                    biased;

                    _ = ticker.tick() => {
                        self.cache.sweep(Utc::now(), self.grace_period);
                        sift_log::debug!(pods = self.cache.pod_count(), "eviction sweep finished");
                    }
                    Some(event) = rx.recv() => self.apply(event),
                    _ = shutdown.notified() => break,
                }
            }

            sift_log::info!("pod watch stopped");
        });

        (tx, handle)
    }

    fn apply(&self, event: WatchEvent) {
        match event {
            WatchEvent::PodAdded(object) | WatchEvent::PodUpdated(object) => {
                if object.name.is_empty() && object.uid.is_empty() {
                    sift_log::warn!("discarding pod event without identity");
                    return;
                }
                self.cache.upsert(&object);
            }
            WatchEvent::PodDeleted(object) => self.cache.forget(&object, Utc::now()),
            WatchEvent::NamespaceAdded(object) | WatchEvent::NamespaceUpdated(object) => {
                if object.name.is_empty() {
                    sift_log::warn!("discarding namespace event without a name");
                    return;
                }
                self.cache.upsert_namespace(&object);
            }
            WatchEvent::NamespaceDeleted(object) => self.cache.forget_namespace(&object.name),
        }
    }
}
