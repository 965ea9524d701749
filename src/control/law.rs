use serde::{Serialize, Deserialize};

use crate::config::NodeConfig;
use crate::core::NeighborSnapshot;
use crate::util::{dequantize, sign};
use super::consensus::{mean_error, ConsensusTerm};
use super::hysteresis::Hysteresis;
use super::state::ControlState;

/// Which control law a node runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LawKind {
    /// State integrates the mean neighbor error
    Integral,
    /// Low-pass filtered mean error with PI action
    PiLowPass,
    /// Finite-time consensus on a virtual state with hysteresis adaptive gain
    #[default]
    AdaptiveFiniteTime,
}

impl LawKind {
    /// Maps the dashboard's numeric `algorithm` code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(LawKind::Integral),
            2 => Some(LawKind::PiLowPass),
            3 => Some(LawKind::AdaptiveFiniteTime),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            LawKind::Integral => 1,
            LawKind::PiLowPass => 2,
            LawKind::AdaptiveFiniteTime => 3,
        }
    }
}

/// Contract shared by every control law variant
pub trait ControlLaw {
    /// Takes new parameters, keeping internal memory
    fn configure(&mut self, config: &NodeConfig);

    /// Clears internal memory kept between steps
    fn reset(&mut self);

    /// Advances `state` by one step of the configured length
    fn step(&mut self, state: &mut ControlState, neighbors: &NeighborSnapshot, disturbance: f64);
}

/// Finite-time robust adaptive consensus
#[derive(Debug, Clone)]
pub struct AdaptiveFiniteTime {
    dt: f64,
    eta: f64,
    consensus: ConsensusTerm,
    hysteresis: Hysteresis,
}

impl AdaptiveFiniteTime {
    pub fn new(config: &NodeConfig) -> Self {
        AdaptiveFiniteTime {
            dt: config.dt_seconds(),
            eta: config.eta_rate(),
            consensus: config.consensus,
            hysteresis: Hysteresis::new(config.epsilon_on, config.epsilon_off),
        }
    }
}

impl ControlLaw for AdaptiveFiniteTime {
    fn configure(&mut self, config: &NodeConfig) {
        self.dt = config.dt_seconds();
        self.eta = config.eta_rate();
        self.consensus = config.consensus;
        self.hysteresis.set_thresholds(config.epsilon_on, config.epsilon_off);
    }

    fn reset(&mut self) {
        self.hysteresis.reset();
    }

    fn step(&mut self, s: &mut ControlState, neighbors: &NeighborSnapshot, disturbance: f64) {
        let gi = self.consensus.evaluate(s.vstate, neighbors);
        let sigma = s.state - s.vstate;
        let gradient = sign(sigma);
        let u = gi - s.vartheta * gradient;
        let dvartheta = self.hysteresis.rate(sigma, self.eta);

        s.state += self.dt * (u + disturbance);
        s.vstate += self.dt * gi;
        s.vartheta += self.dt * dvartheta;

        s.gi = gi;
        s.sigma = sigma;
        s.gradient = gradient;
        s.active = self.hysteresis.is_active();
    }
}

/// Plain integral consensus on the physical state
#[derive(Debug, Clone)]
pub struct IntegralLaw {
    dt: f64,
    gamma: f64,
}

impl IntegralLaw {
    pub fn new(config: &NodeConfig) -> Self {
        IntegralLaw {
            dt: config.dt_seconds(),
            gamma: config.gains.gamma_gain(),
        }
    }
}

impl ControlLaw for IntegralLaw {
    fn configure(&mut self, config: &NodeConfig) {
        *self = IntegralLaw::new(config);
    }

    fn reset(&mut self) {}

    fn step(&mut self, s: &mut ControlState, neighbors: &NeighborSnapshot, disturbance: f64) {
        let error = mean_error(s.state, neighbors);
        s.state += self.dt * (self.gamma * error + disturbance);
        s.vstate = s.state;
        s.gi = error;
        s.sigma = 0.0;
        s.gradient = 0.0;
    }
}

/// PI action on a low-pass filtered, dead-banded mean error
#[derive(Debug, Clone)]
pub struct PiLowPass {
    dt: f64,
    gamma: f64,
    lambda: f64,
    pole: f64,
    dead: f64,
    filtered: f64,
    integral: f64,
}

impl PiLowPass {
    pub fn new(config: &NodeConfig) -> Self {
        PiLowPass {
            dt: config.dt_seconds(),
            gamma: config.gains.gamma_gain(),
            lambda: config.gains.lambda_gain(),
            pole: config.gains.pole_coefficient(),
            dead: dequantize(config.gains.dead),
            filtered: 0.0,
            integral: 0.0,
        }
    }
}

impl ControlLaw for PiLowPass {
    fn configure(&mut self, config: &NodeConfig) {
        let (filtered, integral) = (self.filtered, self.integral);
        *self = PiLowPass::new(config);
        self.filtered = filtered;
        self.integral = integral;
    }

    fn reset(&mut self) {
        self.filtered = 0.0;
        self.integral = 0.0;
    }

    fn step(&mut self, s: &mut ControlState, neighbors: &NeighborSnapshot, disturbance: f64) {
        let mut error = mean_error(s.state, neighbors);
        if error.abs() < self.dead {
            error = 0.0;
        }
        self.filtered = self.pole * self.filtered + (1.0 - self.pole) * error;
        self.integral += self.dt * self.lambda * self.filtered;

        s.state += self.dt * (self.gamma * self.filtered + self.integral + disturbance);
        s.vstate = s.state;
        s.gi = self.filtered;
        s.sigma = 0.0;
        s.gradient = 0.0;
    }
}

/// Tagged union over the available laws
#[derive(Debug, Clone)]
pub enum Law {
    AdaptiveFiniteTime(AdaptiveFiniteTime),
    Integral(IntegralLaw),
    PiLowPass(PiLowPass),
}

impl Law {
    /// Builds the law selected by `config.law`
    pub fn from_config(config: &NodeConfig) -> Self {
        match config.law {
            LawKind::AdaptiveFiniteTime => Law::AdaptiveFiniteTime(AdaptiveFiniteTime::new(config)),
            LawKind::Integral => Law::Integral(IntegralLaw::new(config)),
            LawKind::PiLowPass => Law::PiLowPass(PiLowPass::new(config)),
        }
    }

    pub fn kind(&self) -> LawKind {
        match self {
            Law::AdaptiveFiniteTime(_) => LawKind::AdaptiveFiniteTime,
            Law::Integral(_) => LawKind::Integral,
            Law::PiLowPass(_) => LawKind::PiLowPass,
        }
    }

    fn as_law_mut(&mut self) -> &mut dyn ControlLaw {
        match self {
            Law::AdaptiveFiniteTime(law) => law,
            Law::Integral(law) => law,
            Law::PiLowPass(law) => law,
        }
    }
}

impl ControlLaw for Law {
    fn configure(&mut self, config: &NodeConfig) {
        if self.kind() == config.law {
            self.as_law_mut().configure(config);
        } else {
            *self = Law::from_config(config);
        }
    }

    fn reset(&mut self) {
        self.as_law_mut().reset();
    }

    fn step(&mut self, state: &mut ControlState, neighbors: &NeighborSnapshot, disturbance: f64) {
        self.as_law_mut().step(state, neighbors, disturbance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::testing::node_config;
    use crate::core::NeighborReading;

    fn neighbors(values: &[i32]) -> NeighborSnapshot {
        NeighborSnapshot::from_readings(
            values
                .iter()
                .map(|&vstate| NeighborReading { vstate, enabled: true })
                .collect(),
        )
    }

    #[test]
    fn test_codes() {
        for kind in [LawKind::Integral, LawKind::PiLowPass, LawKind::AdaptiveFiniteTime] {
            assert_eq!(LawKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(LawKind::from_code(0), None);
    }

    #[test]
    fn test_adaptive_step_euler() {
        let config = node_config();
        let mut law = AdaptiveFiniteTime::new(&config);
        let mut s = ControlState {
            state: 1.0,
            vstate: 0.0,
            vartheta: 0.5,
            ..Default::default()
        };
        // one neighbor at z_j = 1.0 -> gi = 1.0; sigma = 1.0 -> active
        law.step(&mut s, &neighbors(&[1000]), 0.0);

        let dt = config.dt_seconds();
        let eta = config.eta_rate();
        assert!((s.gi - 1.0).abs() < 1e-9);
        assert!((s.state - (1.0 + dt * (1.0 - 0.5))).abs() < 1e-9);
        assert!((s.vstate - dt).abs() < 1e-9);
        assert!((s.vartheta - (0.5 + dt * eta)).abs() < 1e-12);
        assert!(s.active);
        assert_eq!(s.gradient, 1.0);
    }

    #[test]
    fn test_integral_moves_toward_mean() {
        let mut config = node_config();
        config.law = LawKind::Integral;
        config.gains.gamma = 1000;
        let mut law = IntegralLaw::new(&config);
        let mut s = ControlState::default();

        law.step(&mut s, &neighbors(&[2000, 4000]), 0.0);
        assert!((s.state - config.dt_seconds() * 3.0).abs() < 1e-9);
        assert_eq!(s.vstate, s.state);
    }

    #[test]
    fn test_pi_low_pass_dead_band() {
        let mut config = node_config();
        config.law = LawKind::PiLowPass;
        config.gains.dead = 500;
        config.gains.gamma = 1000;
        let mut law = PiLowPass::new(&config);
        let mut s = ControlState::default();

        law.step(&mut s, &neighbors(&[100]), 0.0);
        assert_eq!(s.state, 0.0);

        law.step(&mut s, &neighbors(&[2000]), 0.0);
        assert!(s.state > 0.0);
    }

    #[test]
    fn test_switching_kind_rebuilds_law() {
        let mut config = node_config();
        let mut law = Law::from_config(&config);
        assert_eq!(law.kind(), LawKind::AdaptiveFiniteTime);

        config.law = LawKind::PiLowPass;
        law.configure(&config);
        assert_eq!(law.kind(), LawKind::PiLowPass);
    }
}
