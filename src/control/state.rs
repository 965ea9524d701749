use serde::{Serialize, Deserialize};

use crate::util::{dequantize, quantize};

/// Mutable control variables, owned by the engine
///
/// Values are kept in real units between steps and quantized when read out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlState {
    /// Physical state `x`
    pub state: f64,
    /// Virtual consensus state `z`
    pub vstate: f64,
    /// Adaptive gain
    pub vartheta: f64,
    /// `state - vstate` at the last step
    pub sigma: f64,
    /// `sign(sigma)` at the last step
    pub gradient: f64,
    /// Consensus term at the last step
    pub gi: f64,
    /// Disturbance phase counter after the last step
    pub phase: u32,
    /// Hysteresis mode after the last step
    pub active: bool,
}

impl ControlState {
    /// Fresh state from fixed-point initial conditions
    pub fn from_initial(initial: &InitialConditions) -> Self {
        ControlState {
            state: dequantize(initial.state),
            vstate: dequantize(initial.vstate),
            vartheta: dequantize(initial.vartheta),
            ..Default::default()
        }
    }

    /// Quantized view of the integrated variables
    pub fn output(&self) -> ControlOutput {
        ControlOutput {
            state: quantize(self.state),
            vstate: quantize(self.vstate),
            vartheta: quantize(self.vartheta),
        }
    }
}

/// Fixed-point initial conditions of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InitialConditions {
    /// Physical state at the start of a run
    pub state: i32,
    /// Virtual state at the start of a run
    pub vstate: i32,
    /// Adaptive gain at the start of a run
    pub vartheta: i32,
}

/// Fixed-point result of one integration step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlOutput {
    /// Physical state after the step
    pub state: i32,
    /// Virtual state shared with neighbors
    pub vstate: i32,
    /// Adaptive gain after the step
    pub vartheta: i32,
}

impl From<InitialConditions> for ControlOutput {
    fn from(initial: InitialConditions) -> Self {
        ControlOutput {
            state: initial.state,
            vstate: initial.vstate,
            vartheta: initial.vartheta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_round_trip() {
        let initial = InitialConditions { state: 1000, vstate: -500, vartheta: 7 };
        let state = ControlState::from_initial(&initial);
        assert!((state.state - 1.0).abs() < 1e-12);
        assert_eq!(state.output(), ControlOutput::from(initial));
        assert!(!state.active);
    }
}
