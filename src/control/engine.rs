use tracing::debug;

use crate::config::NodeConfig;
use crate::core::NeighborSnapshot;
use super::disturbance::DisturbanceGenerator;
use super::law::{ControlLaw, Law};
use super::state::{ControlOutput, ControlState, InitialConditions};

/// Consensus control engine for one node
///
/// Owns the control variables exclusively. `update` never blocks and never
/// fails: missing or disabled neighbors only shrink the consensus term.
#[derive(Debug)]
pub struct ControlEngine {
    law: Law,
    disturbance: DisturbanceGenerator,
    initial: InitialConditions,
    dt: f64,
    state: ControlState,
}

impl ControlEngine {
    /// Creates an engine already reset to the configured initial conditions
    pub fn new(config: &NodeConfig) -> Self {
        let mut engine = ControlEngine {
            law: Law::from_config(config),
            disturbance: DisturbanceGenerator::new(config.disturbance.to_config(), config.rng_seed),
            initial: config.initial,
            dt: config.dt_seconds(),
            state: ControlState::default(),
        };
        engine.reset_initial_conditions();
        engine
    }

    /// Applies new parameters without touching the control variables
    pub fn configure(&mut self, config: &NodeConfig) {
        self.law.configure(config);
        self.disturbance.reconfigure(config.disturbance.to_config());
        self.initial = config.initial;
        self.dt = config.dt_seconds();
        debug!(node = %config.node, law = ?config.law, "control engine reconfigured");
    }

    /// Restores the configured initial conditions
    pub fn reset_initial_conditions(&mut self) {
        self.law.reset();
        self.disturbance.reset();
        self.state = ControlState::from_initial(&self.initial);
    }

    /// Advances one integration step against `neighbors`
    pub fn update(&mut self, neighbors: &NeighborSnapshot) -> ControlOutput {
        let disturbance = self.disturbance.sample(self.dt);
        self.law.step(&mut self.state, neighbors, disturbance);
        self.state.phase = self.disturbance.counter();
        self.state.output()
    }

    /// Current control variables
    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Quantized view of the current variables
    pub fn output(&self) -> ControlOutput {
        self.state.output()
    }
}
