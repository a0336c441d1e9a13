//! One iteration of the sync loop.
//!
//! 1. Refresh the capture of the configured screen.
//! 2. Average a strided pixel sample.
//! 3. Derive a brightness from the colour's lightness and the
//!    configured ceiling.
//! 4. Snap near-black to black.
//! 5. Write colour and brightness to the bulb, each only if it
//!    changed since the last successful write.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::capture::{RawScreenFrame, ScreenCapture, ScreenProvider};
use crate::device::{Rgb, SharedDevice, Smoothing};
use crate::error::CaptureError;
use crate::scale::to_device_range;
use crate::sync::config::SyncConfig;

/// Channels strictly below this value count as black.
pub const NEAR_BLACK_THRESHOLD: u8 = 10;

// ── SampleFrame ──────────────────────────────────────────────────

/// What one captured frame asks the bulb to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFrame {
    pub color: Rgb,
    /// Device brightness, always in `1..=100`.
    pub brightness: u8,
}

impl SampleFrame {
    pub fn from_frame(frame: &RawScreenFrame, sample_step: u32, brightness_percent: u8) -> Self {
        Self::from_color(frame.average_color(sample_step), brightness_percent)
    }

    pub fn from_color(color: Rgb, brightness_percent: u8) -> Self {
        let factor = f32::from(brightness_percent.clamp(1, 100)) / 100.0;
        let brightness = to_device_range(color.lightness() * factor, 1, 100);
        let color = if color.is_near_black(NEAR_BLACK_THRESHOLD) {
            Rgb::BLACK
        } else {
            color
        };
        Self { color, brightness }
    }
}

// ── ChangeTracker ────────────────────────────────────────────────

/// Which writes an iteration issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Writes {
    pub color: bool,
    pub brightness: bool,
}

impl Writes {
    pub fn any(self) -> bool {
        self.color || self.brightness
    }
}

/// Remembers the last values the bulb accepted.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    color: Option<Rgb>,
    brightness: Option<u8>,
}

impl ChangeTracker {
    /// Forward the parts of `sample` that differ from what was last
    /// written. A failed write is logged and leaves the remembered
    /// value alone, so the next iteration tries again.
    pub async fn apply(&mut self, device: &SharedDevice, sample: SampleFrame, smoothing: Smoothing) -> Writes {
        let mut writes = Writes::default();

        if self.color != Some(sample.color) {
            match device.set_rgb(sample.color, smoothing).await {
                Ok(()) => {
                    self.color = Some(sample.color);
                    writes.color = true;
                }
                Err(e) => warn!("failure when setting sync color to {}: {e}", sample.color),
            }
        }

        if self.brightness != Some(sample.brightness) {
            match device.set_brightness(sample.brightness, smoothing).await {
                Ok(()) => {
                    self.brightness = Some(sample.brightness);
                    writes.brightness = true;
                }
                Err(e) => warn!("failure when setting sync brightness to {}: {e}", sample.brightness),
            }
        }

        writes
    }
}

// ── SyncWorker ───────────────────────────────────────────────────

/// State carried between iterations of one sync loop.
pub struct SyncWorker {
    device: SharedDevice,
    screens: Arc<dyn ScreenProvider>,
    capture: Option<(String, Box<dyn ScreenCapture>)>,
    tracker: ChangeTracker,
    last_error: Option<String>,
}

impl SyncWorker {
    pub fn new(device: SharedDevice, screens: Arc<dyn ScreenProvider>) -> Self {
        Self {
            device,
            screens,
            capture: None,
            tracker: ChangeTracker::default(),
            last_error: None,
        }
    }

    /// Run one iteration against the current settings.
    pub async fn step(&mut self, config: &watch::Receiver<SyncConfig>) -> Result<(SampleFrame, Writes), CaptureError> {
        let screen = config.borrow().screen.clone();
        let sample = match self.sample(&screen, config) {
            Ok(sample) => sample,
            Err(e) => {
                if !matches!(e, CaptureError::Timeout(_)) {
                    // Reopen on the next iteration.
                    self.capture = None;
                }
                return Err(e);
            }
        };

        let smoothing = config.borrow().smoothing;
        let writes = self.tracker.apply(&self.device, sample, smoothing).await;
        if writes.any() {
            trace!("sync wrote {sample:?} ({writes:?})");
        }
        Ok((sample, writes))
    }

    /// Log a failed iteration, once per distinct error.
    pub fn report(&mut self, error: &CaptureError) {
        let message = error.to_string();
        if self.last_error.as_deref() != Some(message.as_str()) {
            warn!("sync capture failed: {message}");
            self.last_error = Some(message);
        }
    }

    pub fn clear_error(&mut self) {
        if self.last_error.take().is_some() {
            debug!("sync capture recovered");
        }
    }

    fn sample(&mut self, screen: &str, config: &watch::Receiver<SyncConfig>) -> Result<SampleFrame, CaptureError> {
        let stale = self.capture.as_ref().is_none_or(|(name, _)| name != screen);
        if stale {
            let capture = self.screens.open(screen)?;
            debug!("sync capturing screen {screen:?}");
            self.capture = Some((screen.to_string(), capture));
        }
        let Some((_, capture)) = self.capture.as_mut() else {
            return Err(CaptureError::UnknownScreen(screen.to_string()));
        };

        let frame = capture.refresh()?;
        let (step, percent) = {
            let cfg = config.borrow();
            (cfg.sample_step, cfg.brightness)
        };
        Ok(SampleFrame::from_frame(frame, step, percent))
    }
}
