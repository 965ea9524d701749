//! Core types and constants for the consensus testbed
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    NeighborReading,
    NeighborSnapshot,
    NodeId,
    NodeRole,
    NodeStatus,
    Telemetry,
    Transport,
};

/// Fixed-point scale shared with the microcontroller firmware
pub const SCALE_FACTOR: f64 = 1000.0;

/// Inverse of [`SCALE_FACTOR`]
pub const INV_SCALE_FACTOR: f64 = 1.0 / SCALE_FACTOR;

/// Scale applied to the adaptive-gain rate `eta`
pub const ETA_SCALE: f64 = 1e-4;

/// Advertised enabled sentinel (0x7f)
pub const NETID_ENABLED: u8 = 127;

/// Advertised disabled sentinel
pub const NETID_DISABLED: u8 = 0;

/// Name advertised by the testbed's radio boards
pub const DEVICE_NAME: &str = "LABCTRL";

/// Manufacturer id used in advertising commands
pub const MANUFACTURER_ID: u16 = 0x0059;
