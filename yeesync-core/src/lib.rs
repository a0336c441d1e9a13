//! # yeesync-core
//!
//! Session control and screen-to-light ambient sync for Yeelight bulbs.
//!
//! This crate contains:
//! - **Scale**: perceptual square / square-root slider curves
//! - **Device**: the `DeviceClient` / `DeviceLocator` boundary and its value types
//! - **Yeelight**: the LAN transport (SSDP discovery, JSON-line control, music mode)
//! - **Capture**: the `ScreenProvider` boundary and the DXGI implementation
//! - **Session**: `DeviceSession`, the single-flight command gate over one bulb
//! - **Sync**: `SyncEngine`, the cancellable screen sampling loop
//! - **Error**: `Error`, `DeviceError`, `CaptureError`

pub mod capture;
pub mod device;
pub mod error;
pub mod scale;
pub mod session;
pub mod sync;
pub mod yeelight;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{DxgiScreens, RawScreenFrame, ScreenCapture, ScreenInfo, ScreenProvider};
pub use device::{DeviceClient, DeviceFault, DeviceLocator, FaultSink, Property, Rgb, SharedDevice, Smoothing};
pub use error::{CaptureError, DeviceError, Error};
pub use session::{
    DISCOVERY_RETRIES, DeviceSession, ExecOutcome, LightState, SessionConfig, SessionHandles, SessionState,
    SkipReason,
};
pub use sync::{SampleFrame, SyncConfig, SyncEngine, SyncState};
pub use yeelight::{YeelightDevice, YeelightLocator};
