//! # yeesync: console front end
//!
//! Loads the TOML configuration, initializes a [`yeesync_core::DeviceSession`]
//! and maps console lines onto its setters.

pub mod config;
pub mod console;
