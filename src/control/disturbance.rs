use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};

/// External disturbance injected into the physical state, in real units
#[derive(Debug, Clone, PartialEq)]
pub struct DisturbanceConfig {
    /// Master switch; when off the disturbance is 0
    pub enabled: bool,
    /// Uniform noise around `offset` instead of the deterministic mix
    pub random: bool,
    /// Uniform noise amplitude
    pub amplitude: f64,
    /// Constant offset of the random mode
    pub offset: f64,
    /// Constant bias of the deterministic mix
    pub beta: f64,
    /// Sinusoid amplitude
    pub sine_amplitude: f64,
    /// Sinusoid frequency in Hz
    pub frequency: f64,
    /// Sinusoid phase shift in seconds
    pub phase: f64,
    /// Length of one disturbance period in samples
    pub samples: u32,
}

impl Default for DisturbanceConfig {
    fn default() -> Self {
        DisturbanceConfig {
            enabled: false,
            random: false,
            amplitude: 0.0,
            offset: 0.0,
            beta: 0.0,
            sine_amplitude: 0.0,
            frequency: 0.0,
            phase: 0.0,
            samples: 1,
        }
    }
}

/// Produces one disturbance sample per integration step
#[derive(Debug)]
pub struct DisturbanceGenerator {
    config: DisturbanceConfig,
    counter: u32,
    rng: StdRng,
    noise: Uniform<f64>,
}

impl DisturbanceGenerator {
    /// Creates a generator; a seed makes the random term reproducible
    pub fn new(config: DisturbanceConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        DisturbanceGenerator {
            config,
            counter: 0,
            rng,
            noise: Uniform::new_inclusive(-1.0, 1.0),
        }
    }

    /// Replaces the parameters without restarting the phase counter
    pub fn reconfigure(&mut self, config: DisturbanceConfig) {
        self.counter %= config.samples.max(1);
        self.config = config;
    }

    /// Restarts the phase counter
    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Current phase counter
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Samples the disturbance for a step of `dt` seconds and advances the counter
    pub fn sample(&mut self, dt: f64) -> f64 {
        let cfg = &self.config;
        let value = if !cfg.enabled {
            0.0
        } else if cfg.random {
            cfg.offset + cfg.amplitude * self.noise.sample(&mut self.rng)
        } else {
            let t = self.counter as f64 * dt;
            let sinusoid = cfg.sine_amplitude * (2.0 * PI * cfg.frequency * (t - cfg.phase)).sin();
            let noise = if cfg.amplitude != 0.0 {
                cfg.amplitude * self.noise.sample(&mut self.rng)
            } else {
                0.0
            };
            cfg.beta + sinusoid + noise
        };

        self.counter = (self.counter + 1) % cfg.samples.max(1);
        value
    }
}
