//! Live-tunable sync settings.

use std::time::Duration;

use crate::device::Smoothing;
use crate::error::Error;

/// Settings the sync loop reads on every iteration.
///
/// Changes made while the loop runs take effect on the next iteration
/// that reads the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Screen identifier; empty selects the primary screen.
    pub screen: String,
    /// Brightness ceiling in percent. Clamped to `1..=100` when used.
    pub brightness: u8,
    /// Transition the bulb ramps over for each write.
    pub smoothing: Smoothing,
    /// Target iterations per second.
    pub fps: u32,
    /// Sample every `sample_step`-th pixel in both axes.
    pub sample_step: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            screen: String::new(),
            brightness: 100,
            smoothing: Smoothing::from_millis(300),
            fps: 30,
            sample_step: 2,
        }
    }
}

impl SyncConfig {
    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.fps == 0 {
            return Err(Error::InvalidConfig("fps must be at least 1"));
        }
        if self.sample_step == 0 {
            return Err(Error::InvalidConfig("sample step must be at least 1"));
        }
        Ok(())
    }

    /// Frame budget: `1000 / fps` milliseconds.
    ///
    /// A zero `fps` (only reachable by editing a running loop's config
    /// directly) is treated as 1.
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}
