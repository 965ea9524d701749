//! Node lifecycle
//!
//! Turns the stream of parameter updates into runs of the control loops,
//! or into serial frames for nodes whose law runs on the microcontroller.

pub mod lifecycle;
pub mod serial_link;

pub use self::lifecycle::{LifecycleState, NodeContext, NodeLifecycle};
pub use self::serial_link::{open_port, spawn_reader, SerialSession};
