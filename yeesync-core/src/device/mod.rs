//! The device boundary.
//!
//! [`DeviceClient`] is the opaque handle to one physical bulb that the
//! session and the sync loop drive. [`DeviceLocator`] finds bulbs on
//! the local network or builds a handle for a known address. The
//! concrete LAN implementation lives in [`crate::yeelight`].

pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DeviceError;

pub use types::{DeviceFault, FaultSink, Property, Rgb, Smoothing};

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Operations the core needs from a networked bulb.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Network address of the bulb, for log lines.
    fn address(&self) -> String;

    /// Open the control connection.
    async fn connect(&self) -> DeviceResult<()>;

    /// Read a single property as its raw string value.
    async fn get_property(&self, property: Property) -> DeviceResult<String>;

    async fn set_power(&self, on: bool, smoothing: Smoothing) -> DeviceResult<()>;

    /// Set brightness in percent (`1..=100`).
    async fn set_brightness(&self, percent: u8, smoothing: Smoothing) -> DeviceResult<()>;

    async fn set_color_temperature(&self, kelvin: u16, smoothing: Smoothing) -> DeviceResult<()>;

    async fn set_rgb(&self, color: Rgb, smoothing: Smoothing) -> DeviceResult<()>;

    /// Switch to a mode that accepts rapid successive commands without
    /// the device closing the connection.
    async fn start_streaming(&self) -> DeviceResult<()>;

    async fn stop_streaming(&self) -> DeviceResult<()>;

    /// Register the channel that receives out-of-band device faults.
    fn subscribe_faults(&self, sink: FaultSink);
}

/// Shared device handle.
pub type SharedDevice = Arc<dyn DeviceClient>;

/// Finds bulbs reachable from this host.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    /// Search the local network, retrying up to `max_retries` times
    /// while nothing answers. May return an empty list.
    async fn discover(&self, max_retries: u32) -> DeviceResult<Vec<SharedDevice>>;

    /// Build a handle for a bulb at a known address without searching.
    fn at_address(&self, address: &str) -> DeviceResult<SharedDevice>;
}
