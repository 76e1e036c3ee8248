//! Periodic refresh scheduling
//!
//! A dedicated thread drives the reconciliation loop: it sleeps on a
//! channel with the refresh period as timeout, so a shutdown message (or
//! the engine being dropped) interrupts the sleep immediately while a
//! timeout fires the next tick. The thread holds only a weak reference to
//! the engine; it can never keep a dropped engine alive.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::engine::Shared;
use crate::error::RouterError;

pub(crate) struct Scheduler {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the refresh thread
    pub fn spawn(shared: Weak<Shared>, period: Duration) -> Result<Self, RouterError> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("pulse-router-refresh".to_string())
            .spawn(move || {
                tracing::debug!(?period, "refresh scheduler started");
                loop {
                    match shutdown_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            let Some(shared) = shared.upgrade() else {
                                break;
                            };
                            shared.try_tick();
                        }
                        // Shutdown message or engine dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("refresh scheduler stopped");
            })
            .map_err(|e| RouterError::Scheduler(e.to_string()))?;

        Ok(Self {
            shutdown_tx,
            handle,
        })
    }

    /// Signal the thread and wait for any in-flight tick to finish
    ///
    /// When called from the scheduler thread itself (a failure hook
    /// calling back into the engine) the join is skipped; the signal
    /// alone makes the loop exit.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if self.handle.thread().id() != std::thread::current().id() {
            let _ = self.handle.join();
        }
    }
}
