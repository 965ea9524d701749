//! Control law engine
//!
//! Implements the per-node consensus update step. Laws are tagged variants
//! sharing one `{configure, reset, step}` contract; the engine wraps the
//! selected law with the disturbance source and the fixed-point boundary.

pub mod consensus;
pub mod disturbance;
pub mod engine;
pub mod hysteresis;
pub mod law;
pub mod state;

pub use self::consensus::ConsensusTerm;
pub use self::disturbance::{DisturbanceConfig, DisturbanceGenerator};
pub use self::engine::ControlEngine;
pub use self::hysteresis::Hysteresis;
pub use self::law::{ControlLaw, Law, LawKind};
pub use self::state::{ControlOutput, ControlState, InitialConditions};

/// Default hysteresis switch-on threshold on `|sigma|`
pub const DEFAULT_EPSILON_ON: f64 = 0.075;

/// Default hysteresis switch-off threshold on `|sigma|`
pub const DEFAULT_EPSILON_OFF: f64 = 0.010;
