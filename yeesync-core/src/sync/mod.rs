//! Screen-to-light ambient sync.
//!
//! [`SyncEngine`] owns a cancellable background loop that mirrors the
//! dominant colour of one screen onto the bulb. Each iteration runs a
//! [`SyncWorker`] step and then sleeps for the frame period.
//!
//! # Lifetime
//!
//! ```text
//! Stopped --start()--> Running --stop()--> Stopped
//! ```
//!
//! [`stop`](SyncEngine::stop) cancels the loop and then awaits its
//! task, so once it returns no loop is left writing to the device. A
//! `start` racing a `stop` waits on the same lock and always observes
//! the fully stopped engine.

pub mod config;
pub mod worker;

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::ScreenProvider;
use crate::device::SharedDevice;
use crate::error::Error;

pub use config::SyncConfig;
pub use worker::{ChangeTracker, NEAR_BLACK_THRESHOLD, SampleFrame, SyncWorker, Writes};

/// Whether the sync loop is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Stopped,
    Running,
}

// ── SyncEngine ───────────────────────────────────────────────────

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives the sync loop for one device.
pub struct SyncEngine {
    device: SharedDevice,
    screens: Arc<dyn ScreenProvider>,
    config: watch::Sender<SyncConfig>,
    state: watch::Sender<SyncState>,
    running: Mutex<Option<LoopHandle>>,
}

impl SyncEngine {
    pub fn new(device: SharedDevice, screens: Arc<dyn ScreenProvider>, config: SyncConfig) -> Self {
        Self {
            device,
            screens,
            config: watch::Sender::new(config),
            state: watch::Sender::new(SyncState::Stopped),
            running: Mutex::new(None),
        }
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> SyncConfig {
        self.config.borrow().clone()
    }

    /// Edit the live settings. A running loop sees the change on the
    /// next iteration that reads the field.
    pub fn update_config(&self, f: impl FnOnce(&mut SyncConfig)) {
        self.config.send_modify(f);
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SyncState::Running
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Launch the loop. Returns once the loop is scheduled, not once it
    /// has produced a frame. A no-op when already running.
    pub async fn start(&self) -> Result<(), Error> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("sync already running");
            return Ok(());
        }
        self.config.borrow().validate()?;

        let cancel = CancellationToken::new();
        let worker = SyncWorker::new(Arc::clone(&self.device), Arc::clone(&self.screens));
        let task = tokio::spawn(run_loop(worker, self.config.subscribe(), cancel.clone()));

        *running = Some(LoopHandle { cancel, task });
        self.state.send_replace(SyncState::Running);
        info!("sync started on {}", self.device.address());
        Ok(())
    }

    /// Cancel the loop and wait for it to exit. A no-op when stopped.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(handle) = running.take() else {
            return;
        };

        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!("sync loop ended abnormally: {e}");
        }
        self.state.send_replace(SyncState::Stopped);
        info!("sync stopped");
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.running.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

/// The loop body. Cancellation is checked once per iteration, before
/// any capture or write, and the frame sleep always runs to completion.
async fn run_loop(mut worker: SyncWorker, config: watch::Receiver<SyncConfig>, cancel: CancellationToken) {
    while !cancel.is_cancelled() {
        match worker.step(&config).await {
            Ok(_) => worker.clear_error(),
            Err(e) => worker.report(&e),
        }
        let period = config.borrow().frame_period();
        tokio::time::sleep(period).await;
    }
    debug!("sync loop observed cancellation");
}
