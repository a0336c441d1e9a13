//! Screen capture boundary.
//!
//! A [`ScreenProvider`] enumerates screens and opens a
//! [`ScreenCapture`] on one of them. The capture hands out a
//! refreshable [`RawScreenFrame`] that the sync loop averages.
//! [`DxgiScreens`] is the Windows implementation.

pub mod dxgi;
pub mod types;

use crate::error::CaptureError;

#[cfg(target_os = "windows")]
pub use dxgi::DxgiCapture;
pub use dxgi::DxgiScreens;
pub use types::{PixelFormat, RawScreenFrame};

/// An attached screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenInfo {
    /// OS device name, e.g. `\\.\DISPLAY2`.
    pub name: String,
    pub primary: bool,
}

/// A capture session bound to one screen.
pub trait ScreenCapture: Send {
    /// Grab the current screen content and return the refreshed buffer.
    fn refresh(&mut self) -> Result<&RawScreenFrame, CaptureError>;
}

/// Enumerates screens and opens captures on them.
pub trait ScreenProvider: Send + Sync {
    fn screens(&self) -> Vec<ScreenInfo>;

    /// Open a capture on the screen matching `name` (see [`select_screen`]).
    fn open(&self, name: &str) -> Result<Box<dyn ScreenCapture>, CaptureError>;

    /// The screen an empty selection resolves to.
    fn primary(&self) -> Option<ScreenInfo> {
        let screens = self.screens();
        screens
            .iter()
            .find(|s| s.primary)
            .or_else(|| screens.first())
            .cloned()
    }
}

/// Pick the screen `name` refers to.
///
/// An exact (case-insensitive) name wins; otherwise the first screen
/// whose name contains `name` is chosen, so `"2"` selects
/// `\\.\DISPLAY2`. An empty name selects the primary screen.
pub fn select_screen<'a>(screens: &'a [ScreenInfo], name: &str) -> Option<&'a ScreenInfo> {
    let name = name.trim();
    if name.is_empty() {
        return screens.iter().find(|s| s.primary).or_else(|| screens.first());
    }
    let needle = name.to_lowercase();
    screens
        .iter()
        .find(|s| s.name.to_lowercase() == needle)
        .or_else(|| screens.iter().find(|s| s.name.to_lowercase().contains(&needle)))
}
