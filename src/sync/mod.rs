//! Loop scheduling
//!
//! Two independently timed loops per run: a fast one that integrates the
//! control law every `dt` and a slow one that refreshes neighbor states.
//! They meet at a [`SnapshotCell`], swapped whole by the slow loop.

pub mod scheduler;
pub mod snapshot;

pub use self::scheduler::{LoopScheduler, RunParts, SchedulerState};
pub use self::snapshot::{Shared, SnapshotCell};
