//! Consensus testbed node
//!
//! Runs one agent of a multi-node consensus-control testbed. Each node holds
//! a physical `state` and a virtual `vstate`, exchanges virtual states with
//! its neighbors over radio advertising, local-network polling or a serial
//! link to a microcontroller, and integrates a finite-time adaptive consensus
//! law that drives all agents toward agreement under disturbance.
pub mod config;
pub mod control;
pub mod core;
pub mod network;
pub mod node;
pub mod protocol;
pub mod sync;
pub mod util;

// Re-export commonly used items
pub use crate::config::{NodeConfig, ParameterUpdate, RuntimeConfig};
pub use crate::core::{Error, NodeId, NodeRole, Result, Telemetry};
pub use crate::node::{LifecycleState, NodeContext, NodeLifecycle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
