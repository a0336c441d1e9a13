//! Domain-specific error types for yeesync.
//!
//! Only session initialization surfaces an [`Error`] to callers as an
//! observable failure. Command and sync-loop errors are logged where
//! they occur and never escape the core.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the yeesync core.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session Errors ───────────────────────────────────────────
    /// Discovery found nothing and no fallback address is configured.
    #[error("no device found and no fallback address configured")]
    NoDevice,

    /// A property read during hydration did not parse.
    #[error("invalid value for property {name}: {value:?}")]
    InvalidProperty { name: &'static str, value: String },

    /// `initialize` was called on a session that already ran it.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// A configuration value is unusable (e.g. zero frames per second).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    // ── Wrapped Errors ───────────────────────────────────────────
    /// The device transport reported an error.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

}

// ── DeviceError ───────────────────────────────────────────────────

/// Errors raised by a [`DeviceClient`](crate::device::DeviceClient).
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The TCP/UDP layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not reply before the deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The command needs a connection that was never established.
    #[error("not connected")]
    NotConnected,

    /// An internal channel closed, usually because the bulb dropped
    /// the connection.
    #[error("channel closed")]
    ChannelClosed,

    /// The bulb answered with an error object.
    #[error("device rejected command ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// A message could not be encoded or decoded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The address string could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl From<serde_json::Error> for DeviceError {
    fn from(e: serde_json::Error) -> Self {
        DeviceError::Malformed(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DeviceError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DeviceError::ChannelClosed
    }
}

// ── CaptureError ──────────────────────────────────────────────────

/// Errors raised by a [`ScreenCapture`](crate::capture::ScreenCapture).
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No screen matched the requested identifier.
    #[error("no screen matching {0:?}")]
    UnknownScreen(String),

    /// Screen capture is not implemented for this platform.
    #[error("screen capture is not supported on this platform")]
    Unsupported,

    /// No frame arrived within the deadline and none is cached.
    #[error("no frame within {0:?}")]
    Timeout(Duration),

    /// The OS capture API failed.
    #[error("{0}")]
    Platform(String),
}
