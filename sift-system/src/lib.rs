//! Service lifecycle primitives for the sift pipeline.
//!
//! Background loops in the pipeline (the watch cache sweeper, the trace
//! decision scheduler) own their state and run until told to stop. The
//! [`Controller`] is the single owner of the stop signal: it is constructed
//! explicitly by whoever assembles the pipeline, and each loop receives a
//! [`ShutdownHandle`] to observe. There is no global registry; dropping the
//! controller without triggering a shutdown leaves handles pending.

#![warn(missing_docs)]

use std::time::Duration;

use tokio::sync::watch;

/// A shutdown request delivered to background loops.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    /// The timeout for graceful shutdown.
    ///
    /// `None` requests an immediate, non-graceful stop.
    pub timeout: Option<Duration>,
}

/// Issues the shutdown signal observed by all [`ShutdownHandle`]s.
#[derive(Debug)]
pub struct Controller {
    tx: watch::Sender<Option<Shutdown>>,
}

impl Controller {
    /// Creates a new controller with no shutdown in progress.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Returns a handle observing this controller's shutdown signal.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.tx.subscribe())
    }

    /// Triggers a shutdown with the given graceful timeout.
    ///
    /// All current and future [`ShutdownHandle`]s resolve. Triggering a
    /// shutdown twice keeps the first request.
    pub fn shutdown(&self, timeout: Option<Duration>) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(Shutdown { timeout });
            true
        });
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

/// Observes the shutdown signal of a [`Controller`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle(watch::Receiver<Option<Shutdown>>);

impl ShutdownHandle {
    /// Waits until a shutdown is triggered.
    ///
    /// If the controller is dropped without triggering a shutdown, this
    /// future never resolves.
    pub async fn notified(&mut self) -> Shutdown {
        loop {
            if let Some(shutdown) = self.0.borrow_and_update().clone() {
                return shutdown;
            }

            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
