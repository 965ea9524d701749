use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::control::DisturbanceConfig;
use crate::core::serde::{deserialize_fixed, deserialize_flag};
use crate::core::{NodeId, NodeRole, Result};
use crate::util::dequantize;

/// Disturbance block of a parameter update, in wire units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisturbanceParams {
    #[serde(deserialize_with = "deserialize_flag")]
    pub disturbance_on: bool,
    /// Uniform noise around `offset` instead of the deterministic mix
    #[serde(deserialize_with = "deserialize_flag")]
    pub random: bool,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub amplitude: i32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub offset: i32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub beta: i32,
    /// Sinusoid amplitude
    #[serde(rename = "Amp", deserialize_with = "deserialize_fixed")]
    pub amp: i32,
    /// Sinusoid frequency in Hz
    #[serde(deserialize_with = "deserialize_fixed")]
    pub frequency: i32,
    /// Sinusoid phase shift, fixed-point seconds
    #[serde(deserialize_with = "deserialize_fixed")]
    pub phase: i32,
    pub samples: u32,
}

impl Default for DisturbanceParams {
    fn default() -> Self {
        DisturbanceParams {
            disturbance_on: false,
            random: false,
            amplitude: 0,
            offset: 0,
            beta: 0,
            amp: 0,
            frequency: 0,
            phase: 0,
            samples: 1,
        }
    }
}

impl DisturbanceParams {
    /// Converts to real units for the disturbance generator
    pub fn to_config(&self) -> DisturbanceConfig {
        DisturbanceConfig {
            enabled: self.disturbance_on,
            random: self.random,
            amplitude: dequantize(self.amplitude),
            offset: dequantize(self.offset),
            beta: dequantize(self.beta),
            sine_amplitude: dequantize(self.amp),
            frequency: self.frequency as f64,
            phase: dequantize(self.phase),
            samples: self.samples,
        }
    }
}

/// Parameter update pushed by the dashboard, as received on the wire
///
/// Loosely typed on purpose: flags may arrive as `0/1`, numbers as floats.
/// Turned into a [`super::NodeConfig`] by validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterUpdate {
    #[serde(deserialize_with = "deserialize_flag")]
    pub enabled: bool,
    pub node: NodeId,
    pub neighbors: Vec<NodeId>,
    pub neighbor_types: BTreeMap<NodeId, NodeRole>,
    pub neighbor_addresses: BTreeMap<NodeId, String>,
    /// Microcontroller clock period, ms
    pub clock: u32,
    /// Integration step, ms
    pub dt: u32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub state: i32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub vstate: i32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub vartheta: i32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub eta: i32,
    pub disturbance: DisturbanceParams,
    /// 1 integral, 2 PI low-pass, 3 adaptive finite-time
    pub algorithm: Option<u8>,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub gamma: i32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub lambda: i32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub pole: i32,
    #[serde(deserialize_with = "deserialize_fixed")]
    pub dead: i32,
    #[serde(deserialize_with = "deserialize_flag")]
    pub laplacian: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub trigger: bool,
}

impl Default for ParameterUpdate {
    fn default() -> Self {
        ParameterUpdate {
            enabled: true,
            node: NodeId::default(),
            neighbors: Vec::new(),
            neighbor_types: BTreeMap::new(),
            neighbor_addresses: BTreeMap::new(),
            clock: 1000,
            dt: 10,
            state: 0,
            vstate: 0,
            vartheta: 0,
            eta: 0,
            disturbance: DisturbanceParams::default(),
            algorithm: None,
            gamma: 0,
            lambda: 0,
            pole: 0,
            dead: 0,
            laplacian: false,
            trigger: false,
        }
    }
}

impl ParameterUpdate {
    /// Parses one JSON object
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
