//! Value types shared across the device boundary.

use std::fmt;

// ── Rgb ──────────────────────────────────────────────────────────

/// An 8-bit-per-channel colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// HSL lightness in `[0, 1]`: the mean of the largest and smallest
    /// channel.
    pub fn lightness(self) -> f32 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        (f32::from(max) + f32::from(min)) / 510.0
    }

    /// `true` when every channel is strictly below `threshold`.
    pub fn is_near_black(self, threshold: u8) -> bool {
        self.r < threshold && self.g < threshold && self.b < threshold
    }

    /// Pack into the `0xRRGGBB` integer the bulb expects.
    pub fn to_packed(self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

// ── Smoothing ────────────────────────────────────────────────────

/// Transition duration the device interpolates over, in milliseconds.
///
/// Zero means "no ramp". Any non-positive input normalizes to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Smoothing(u32);

impl Smoothing {
    pub const NONE: Smoothing = Smoothing(0);

    pub fn from_millis(ms: i64) -> Self {
        Self(u32::try_from(ms.max(0)).unwrap_or(u32::MAX))
    }

    pub fn as_millis(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

// ── Property ─────────────────────────────────────────────────────

/// Device properties read during session hydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Power,
    Brightness,
    ColorTemperature,
}

impl Property {
    /// The wire name of the property.
    pub const fn name(self) -> &'static str {
        match self {
            Property::Power => "power",
            Property::Brightness => "bright",
            Property::ColorTemperature => "ct",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── DeviceFault ──────────────────────────────────────────────────

/// An error the device transport reports out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFault {
    /// Address of the device that raised the fault.
    pub address: String,
    pub message: String,
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address, self.message)
    }
}

/// Channel on which transports push [`DeviceFault`]s.
pub type FaultSink = tokio::sync::mpsc::UnboundedSender<DeviceFault>;
