//! Device session: discovery, hydration and gated command execution.
//!
//! A [`DeviceSession`] owns one bulb for the life of the process.
//! [`initialize`](DeviceSession::initialize) runs once and moves the
//! session from `Initializing` to `Ready` or `Failed`. After that every
//! user-facing setter goes through [`exec`](DeviceSession::exec), which
//! admits at most one command at a time and drops the rest.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::capture::{ScreenInfo, ScreenProvider};
use crate::device::{DeviceFault, DeviceLocator, Property, SharedDevice, Smoothing};
use crate::error::Error;
use crate::sync::{SyncConfig, SyncEngine};

/// Discovery attempts made before falling back.
pub const DISCOVERY_RETRIES: u32 = 3;

pub const MIN_BRIGHTNESS: u8 = 1;
pub const MAX_BRIGHTNESS: u8 = 100;
pub const MIN_COLOR_TEMPERATURE: u16 = 1700;
pub const MAX_COLOR_TEMPERATURE: u16 = 6500;

// ── Public types ─────────────────────────────────────────────────

/// Settings a session is built with.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Address used when discovery finds nothing. `None` makes an empty
    /// discovery fatal.
    pub fallback_address: Option<String>,
    /// Initial sync settings.
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Initializing,
    Ready,
    Failed,
}

/// Power, brightness and colour temperature as last hydrated or
/// requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightState {
    pub power: bool,
    pub brightness: u8,
    pub color_temperature: u16,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            power: false,
            brightness: MIN_BRIGHTNESS,
            color_temperature: MIN_COLOR_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The session is not `Ready`.
    NotReady,
    /// Another command holds the gate.
    Busy,
}

/// What [`DeviceSession::exec`] did with an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Done,
    /// The operation ran and returned an error, already logged.
    Failed(String),
    /// The operation was never invoked.
    Skipped(SkipReason),
}

impl ExecOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ExecOutcome::Done)
    }

    /// Combine two sequential outcomes, keeping the first that was not
    /// `Done`.
    pub fn and(self, next: ExecOutcome) -> ExecOutcome {
        if self.is_done() { next } else { self }
    }
}

/// What a gated operation gets to work with.
#[derive(Clone)]
pub struct SessionHandles {
    pub device: SharedDevice,
    pub sync: Arc<SyncEngine>,
}

// ── CommandGate ──────────────────────────────────────────────────

/// Non-blocking single-flight flag.
#[derive(Debug, Default)]
struct CommandGate {
    busy: AtomicBool,
}

impl CommandGate {
    fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }
}

/// Releases the gate when dropped, whatever the operation returned.
struct GateGuard<'a> {
    gate: &'a CommandGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

// ── DeviceSession ────────────────────────────────────────────────

pub struct DeviceSession {
    config: SessionConfig,
    locator: Arc<dyn DeviceLocator>,
    screens: Arc<dyn ScreenProvider>,
    initialized: AtomicBool,
    state: watch::Sender<SessionState>,
    light: watch::Sender<LightState>,
    handles: OnceLock<SessionHandles>,
    gate: CommandGate,
}

impl DeviceSession {
    pub fn new(config: SessionConfig, locator: Arc<dyn DeviceLocator>, screens: Arc<dyn ScreenProvider>) -> Self {
        Self {
            config,
            locator,
            screens,
            initialized: AtomicBool::new(false),
            state: watch::Sender::new(SessionState::Initializing),
            light: watch::Sender::new(LightState::default()),
            handles: OnceLock::new(),
            gate: CommandGate::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn light(&self) -> LightState {
        *self.light.borrow()
    }

    pub fn watch_light(&self) -> watch::Receiver<LightState> {
        self.light.subscribe()
    }

    /// The sync engine, once the session is `Ready`.
    pub fn sync(&self) -> Option<&Arc<SyncEngine>> {
        self.handles.get().map(|h| &h.sync)
    }

    pub fn is_syncing(&self) -> bool {
        self.sync().is_some_and(|s| s.is_running())
    }

    pub fn screens(&self) -> Vec<ScreenInfo> {
        self.screens.screens()
    }

    // ── Initialization ───────────────────────────────────────────

    /// Discover, connect and hydrate. Runs at most once; any failure
    /// leaves the session permanently `Failed` and is returned.
    pub async fn initialize(&self) -> Result<(), Error> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyInitialized);
        }

        match self.hydrate().await {
            Ok(handles) => {
                // `initialized` guarantees this is the only set.
                let _ = self.handles.set(handles);
                self.state.send_replace(SessionState::Ready);
                info!("session ready");
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(SessionState::Failed);
                error!("failed to initialize: {e}");
                Err(e)
            }
        }
    }

    async fn hydrate(&self) -> Result<SessionHandles, Error> {
        let device = self.locate().await?;

        log_task(format!("connecting to {}", device.address()), device.connect()).await?;

        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        device.subscribe_faults(fault_tx);
        tokio::spawn(forward_faults(fault_rx));

        let power = self.read(&device, Property::Power, "reading power", parse_power).await?;
        let brightness = self
            .read(&device, Property::Brightness, "reading brightness", |v| {
                v.trim()
                    .parse::<u8>()
                    .ok()
                    .map(|b| b.clamp(MIN_BRIGHTNESS, MAX_BRIGHTNESS))
            })
            .await?;
        let color_temperature = self
            .read(&device, Property::ColorTemperature, "reading color temperature", |v| {
                v.trim().parse::<u16>().ok()
            })
            .await?;

        self.light.send_replace(LightState {
            power,
            brightness,
            color_temperature,
        });

        if power {
            // Not fatal: the bulb still takes plain commands.
            let _ = log_task("starting music mode", device.start_streaming()).await;
        }

        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&device),
            Arc::clone(&self.screens),
            self.config.sync.clone(),
        ));
        Ok(SessionHandles { device, sync })
    }

    async fn locate(&self) -> Result<SharedDevice, Error> {
        let fallback = self.config.fallback_address.as_deref();

        let found = match log_task("searching for devices", self.locator.discover(DISCOVERY_RETRIES)).await {
            Ok(found) => found,
            Err(_) if fallback.is_some() => Vec::new(),
            Err(e) => return Err(e),
        };
        info!("found {} device(s)", found.len());

        if let Some(device) = found.into_iter().next() {
            return Ok(device);
        }
        match fallback {
            Some(address) => {
                info!("using fallback address {address}");
                Ok(self.locator.at_address(address)?)
            }
            None => Err(Error::NoDevice),
        }
    }

    async fn read<T>(
        &self,
        device: &SharedDevice,
        property: Property,
        description: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Result<T, Error> {
        let raw = log_task(description, device.get_property(property)).await?;
        parse(&raw).ok_or_else(|| Error::InvalidProperty {
            name: property.name(),
            value: raw,
        })
    }

    // ── Command execution ────────────────────────────────────────

    /// Run `op` against the device if the session is ready and no other
    /// command is in flight. Otherwise `op` is never invoked.
    ///
    /// Errors from `op` are logged with `description` and returned as
    /// [`ExecOutcome::Failed`]; they never propagate further.
    pub async fn exec<F, Fut>(&self, description: impl Display, op: F) -> ExecOutcome
    where
        F: FnOnce(SessionHandles) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let Some(handles) = self.handles.get() else {
            return ExecOutcome::Skipped(SkipReason::NotReady);
        };
        if self.state() != SessionState::Ready {
            return ExecOutcome::Skipped(SkipReason::NotReady);
        }
        let Some(_guard) = self.gate.try_acquire() else {
            debug!("dropped \"{description}\": command in flight");
            return ExecOutcome::Skipped(SkipReason::Busy);
        };

        match log_task(&description, op(handles.clone())).await {
            Ok(()) => ExecOutcome::Done,
            Err(e) => ExecOutcome::Failed(e.to_string()),
        }
    }

    /// Record a requested light change unless the session cannot take
    /// commands at all.
    fn remember(&self, outcome: &ExecOutcome, f: impl FnOnce(&mut LightState)) {
        if *outcome != ExecOutcome::Skipped(SkipReason::NotReady) {
            self.light.send_modify(f);
        }
    }

    // ── Setters ──────────────────────────────────────────────────

    /// Turning on also starts music mode; turning off stops it first.
    pub async fn set_power(&self, on: bool) -> ExecOutcome {
        let outcome = if on {
            let power = self
                .exec("turning device on", |h| async move {
                    h.device.set_power(true, Smoothing::NONE).await.map_err(Error::from)
                })
                .await;
            let music = self
                .exec("starting music mode", |h| async move {
                    h.device.start_streaming().await.map_err(Error::from)
                })
                .await;
            power.and(music)
        } else {
            let music = self
                .exec("stopping music mode", |h| async move {
                    h.device.stop_streaming().await.map_err(Error::from)
                })
                .await;
            let power = self
                .exec("turning device off", |h| async move {
                    h.device.set_power(false, Smoothing::NONE).await.map_err(Error::from)
                })
                .await;
            music.and(power)
        };
        self.remember(&outcome, |l| l.power = on);
        outcome
    }

    pub async fn toggle_power(&self) -> ExecOutcome {
        self.set_power(!self.light().power).await
    }

    /// While syncing this sets the sync brightness ceiling instead of
    /// writing to the bulb.
    pub async fn set_brightness(&self, percent: u8) -> ExecOutcome {
        let percent = percent.clamp(MIN_BRIGHTNESS, MAX_BRIGHTNESS);
        let outcome = if self.is_syncing() {
            self.configure(format!("setting sync brightness to {percent}"), move |c| {
                c.brightness = percent
            })
            .await
        } else {
            self.exec(format!("setting brightness to {percent}"), |h| async move {
                h.device.set_brightness(percent, Smoothing::NONE).await.map_err(Error::from)
            })
            .await
        };
        self.remember(&outcome, |l| l.brightness = percent);
        outcome
    }

    pub async fn set_color_temperature(&self, kelvin: u16) -> ExecOutcome {
        let kelvin = kelvin.clamp(MIN_COLOR_TEMPERATURE, MAX_COLOR_TEMPERATURE);
        let outcome = self
            .exec(format!("setting color temperature to {kelvin}"), |h| async move {
                h.device
                    .set_color_temperature(kelvin, Smoothing::NONE)
                    .await
                    .map_err(Error::from)
            })
            .await;
        self.remember(&outcome, |l| l.color_temperature = kelvin);
        outcome
    }

    pub async fn set_sync_running(&self, running: bool) -> ExecOutcome {
        let description = if running { "starting sync" } else { "stopping sync" };
        self.exec(description, |h| async move {
            if running {
                h.sync.start().await
            } else {
                h.sync.stop().await;
                Ok(())
            }
        })
        .await
    }

    pub async fn toggle_sync(&self) -> ExecOutcome {
        self.set_sync_running(!self.is_syncing()).await
    }

    pub async fn set_screen(&self, screen: impl Into<String>) -> ExecOutcome {
        let screen = screen.into();
        self.configure(format!("setting sync screen to {screen:?}"), move |c| c.screen = screen)
            .await
    }

    /// Negative durations become 0 ("sudden").
    pub async fn set_smooth(&self, millis: i64) -> ExecOutcome {
        let smoothing = Smoothing::from_millis(millis);
        self.configure(format!("setting sync smooth to {}", smoothing.as_millis()), move |c| {
            c.smoothing = smoothing
        })
        .await
    }

    pub async fn set_fps(&self, fps: u32) -> ExecOutcome {
        self.exec(format!("setting sync fps to {fps}"), |h| async move {
            if fps == 0 {
                return Err(Error::InvalidConfig("fps must be at least 1"));
            }
            h.sync.update_config(|c| c.fps = fps);
            Ok(())
        })
        .await
    }

    pub async fn set_sample_step(&self, step: u32) -> ExecOutcome {
        self.exec(format!("setting sync sample step to {step}"), |h| async move {
            if step == 0 {
                return Err(Error::InvalidConfig("sample step must be at least 1"));
            }
            h.sync.update_config(|c| c.sample_step = step);
            Ok(())
        })
        .await
    }

    /// Gated edit of the live sync settings.
    async fn configure(&self, description: String, f: impl FnOnce(&mut SyncConfig)) -> ExecOutcome {
        self.exec(description, |h| async move {
            h.sync.update_config(f);
            Ok::<(), Error>(())
        })
        .await
    }

    /// Stop the sync loop, waiting for it to exit. Bypasses the gate so
    /// shutdown is never dropped.
    pub async fn shutdown(&self) {
        if let Some(sync) = self.sync() {
            sync.stop().await;
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Await `task`, logging `"<description> ... done"` or
/// `"failure when <description>: <error>"`.
async fn log_task<T, E, Fut>(description: impl Display, task: Fut) -> Result<T, Error>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<Error>,
{
    match task.await.map_err(Into::into) {
        Ok(value) => {
            info!("{description} ... done");
            Ok(value)
        }
        Err(e) => {
            error!("failure when {description}: {e}");
            Err(e)
        }
    }
}

async fn forward_faults(mut faults: mpsc::UnboundedReceiver<DeviceFault>) {
    while let Some(fault) = faults.recv().await {
        error!("device error from {fault}");
    }
    warn!("device fault channel closed");
}

fn parse_power(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" => Some(true),
        "off" | "false" => Some(false),
        _ => None,
    }
}
