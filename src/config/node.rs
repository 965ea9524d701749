use std::collections::BTreeSet;
use std::time::Duration;

use crate::control::{ConsensusTerm, InitialConditions, LawKind};
use crate::core::{Error, NodeId, NodeRole, Result, Transport, ETA_SCALE};
use crate::protocol::AdvertLayout;
use super::update::{DisturbanceParams, ParameterUpdate};
use super::RuntimeConfig;

/// One configured neighbor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSpec {
    pub id: NodeId,
    /// Role of the neighbor node, which decides how it is reached
    pub role: NodeRole,
    /// Base URL of the neighbor's status endpoint (network neighbors)
    pub address: Option<String>,
}

impl NeighborSpec {
    /// Transport used to read this neighbor
    pub fn transport(&self) -> Transport {
        self.role.transport()
    }
}

/// Gains of the integral and PI laws, in wire units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LawGains {
    /// Proportional gain, x1e-3
    pub gamma: i32,
    /// Integral gain, x1e-6
    pub lambda: i32,
    /// Low-pass pole, in hundredths
    pub pole: i32,
    /// Dead band, fixed-point
    pub dead: i32,
}

impl LawGains {
    pub fn gamma_gain(&self) -> f64 {
        self.gamma as f64 * 1e-3
    }

    pub fn lambda_gain(&self) -> f64 {
        self.lambda as f64 * 1e-6
    }

    pub fn pole_coefficient(&self) -> f64 {
        self.pole as f64 * 0.01
    }
}

/// Validated, strongly typed parameters of one run
///
/// Built from a [`ParameterUpdate`] and the process [`RuntimeConfig`];
/// replaced wholesale on each accepted update.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub enabled: bool,
    pub node: NodeId,
    /// Neighbors in consensus order
    pub neighbors: Vec<NeighborSpec>,
    /// Microcontroller clock period, ms (forwarded as-is)
    pub clock: u32,
    /// Integration step, ms
    pub dt: u32,
    /// Neighbor refresh period
    pub refresh_period: Duration,
    pub initial: InitialConditions,
    /// Adaptive gain rate, x1e-4
    pub eta: i32,
    pub disturbance: DisturbanceParams,
    pub law: LawKind,
    pub consensus: ConsensusTerm,
    pub gains: LawGains,
    pub epsilon_on: f64,
    pub epsilon_off: f64,
    pub trigger: bool,
    pub advert_layout: AdvertLayout,
    /// Seed for the disturbance noise; entropy when unset
    pub rng_seed: Option<u64>,
}

impl NodeConfig {
    /// Validates an update against the process configuration
    pub fn from_update(update: &ParameterUpdate, runtime: &RuntimeConfig) -> Result<Self> {
        if update.dt == 0 {
            return Err(Error::config("dt must be positive"));
        }
        if update.disturbance.samples == 0 {
            return Err(Error::config("disturbance samples must be positive"));
        }
        if update.eta < 0 {
            return Err(Error::config(format!("eta must not be negative, got {}", update.eta)));
        }
        if runtime.epsilon_on <= runtime.epsilon_off {
            return Err(Error::config(format!(
                "epsilon_on ({}) must exceed epsilon_off ({})",
                runtime.epsilon_on, runtime.epsilon_off
            )));
        }
        if runtime.network_refresh_interval.is_zero() {
            return Err(Error::config("network refresh interval must be positive"));
        }

        let law = match update.algorithm {
            None => LawKind::default(),
            Some(code) => LawKind::from_code(code)
                .ok_or_else(|| Error::config(format!("unknown algorithm code {}", code)))?,
        };

        let mut seen = BTreeSet::new();
        let mut neighbors = Vec::with_capacity(update.neighbors.len());
        for &id in &update.neighbors {
            if id == update.node {
                return Err(Error::config(format!("node {} lists itself as a neighbor", id)));
            }
            if !seen.insert(id) {
                return Err(Error::config(format!("neighbor {} listed twice", id)));
            }
            let role = *update
                .neighbor_types
                .get(&id)
                .ok_or_else(|| Error::config(format!("neighbor {} has no transport type", id)))?;
            let address = update.neighbor_addresses.get(&id).cloned();

            // Ble nodes hand the whole topology to the firmware
            if runtime.role.runs_local_engine() {
                match role.transport() {
                    Transport::Network if address.is_none() => {
                        return Err(Error::config(format!("network neighbor {} has no address", id)));
                    }
                    Transport::Radio if runtime.role != NodeRole::Bridge => {
                        return Err(Error::config(format!(
                            "radio neighbor {} needs a bridge node, this node is {}",
                            id, runtime.role
                        )));
                    }
                    _ => {}
                }
            }

            neighbors.push(NeighborSpec { id, role, address });
        }

        Ok(NodeConfig {
            role: runtime.role,
            enabled: update.enabled,
            node: update.node,
            neighbors,
            clock: update.clock,
            dt: update.dt,
            refresh_period: runtime.network_refresh_interval,
            initial: InitialConditions {
                state: update.state,
                vstate: update.vstate,
                vartheta: update.vartheta,
            },
            eta: update.eta,
            disturbance: update.disturbance,
            law,
            consensus: ConsensusTerm::from_laplacian_flag(update.laplacian),
            gains: LawGains {
                gamma: update.gamma,
                lambda: update.lambda,
                pole: update.pole,
                dead: update.dead,
            },
            epsilon_on: runtime.epsilon_on,
            epsilon_off: runtime.epsilon_off,
            trigger: update.trigger,
            advert_layout: runtime.advert_layout,
            rng_seed: runtime.rng_seed,
        })
    }

    /// Integration step in seconds
    pub fn dt_seconds(&self) -> f64 {
        self.dt as f64 / 1000.0
    }

    /// Fast-loop period
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.dt as u64)
    }

    /// Adaptive gain growth per second while active
    pub fn eta_rate(&self) -> f64 {
        self.eta as f64 * ETA_SCALE
    }

    /// Neighbor ids in consensus order
    pub fn neighbor_ids(&self) -> Vec<NodeId> {
        self.neighbors.iter().map(|n| n.id).collect()
    }

    /// Neighbors reached by radio
    pub fn radio_neighbors(&self) -> impl Iterator<Item = &NeighborSpec> {
        self.neighbors.iter().filter(|n| n.transport() == Transport::Radio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn runtime(role: NodeRole) -> RuntimeConfig {
        RuntimeConfig {
            role,
            ..Default::default()
        }
    }

    fn update() -> ParameterUpdate {
        ParameterUpdate {
            node: NodeId(3),
            neighbors: vec![NodeId(4), NodeId(8)],
            neighbor_types: BTreeMap::from([(NodeId(4), NodeRole::Ble), (NodeId(8), NodeRole::Wifi)]),
            neighbor_addresses: BTreeMap::from([(NodeId(8), "http://10.0.0.8:3004".to_string())]),
            state: 3000,
            eta: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_bridge_accepts_mixed_neighbors() {
        let config = NodeConfig::from_update(&update(), &runtime(NodeRole::Bridge)).unwrap();
        assert_eq!(config.neighbor_ids(), vec![NodeId(4), NodeId(8)]);
        assert_eq!(config.neighbors[0].transport(), Transport::Radio);
        assert_eq!(config.radio_neighbors().count(), 1);
        assert_eq!(config.initial.state, 3000);
        assert_eq!(config.law, LawKind::AdaptiveFiniteTime);
        assert_eq!(config.period(), Duration::from_millis(10));
        assert!((config.eta_rate() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_wifi_rejects_radio_neighbor() {
        let err = NodeConfig::from_update(&update(), &runtime(NodeRole::Wifi)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        // Firmware nodes carry any topology
        assert!(NodeConfig::from_update(&update(), &runtime(NodeRole::Ble)).is_ok());
    }

    #[test]
    fn test_rejects_inconsistent_neighbors() {
        let bridge = runtime(NodeRole::Bridge);

        let mut missing_type = update();
        missing_type.neighbor_types.remove(&NodeId(8));
        assert!(NodeConfig::from_update(&missing_type, &bridge).is_err());

        let mut missing_address = update();
        missing_address.neighbor_addresses.clear();
        assert!(NodeConfig::from_update(&missing_address, &bridge).is_err());

        let mut duplicate = update();
        duplicate.neighbors.push(NodeId(4));
        assert!(NodeConfig::from_update(&duplicate, &bridge).is_err());

        let mut itself = update();
        itself.neighbors.push(NodeId(3));
        itself.neighbor_types.insert(NodeId(3), NodeRole::Bridge);
        assert!(NodeConfig::from_update(&itself, &bridge).is_err());
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let bridge = runtime(NodeRole::Bridge);

        let mut zero_dt = update();
        zero_dt.dt = 0;
        assert!(NodeConfig::from_update(&zero_dt, &bridge).is_err());

        let mut zero_samples = update();
        zero_samples.disturbance.samples = 0;
        assert!(NodeConfig::from_update(&zero_samples, &bridge).is_err());

        let mut bad_algorithm = update();
        bad_algorithm.algorithm = Some(9);
        assert!(NodeConfig::from_update(&bad_algorithm, &bridge).is_err());

        let inverted = RuntimeConfig {
            epsilon_on: 0.01,
            epsilon_off: 0.05,
            ..bridge
        };
        assert!(NodeConfig::from_update(&update(), &inverted).is_err());
    }

    #[test]
    fn test_algorithm_and_laplacian_selection() {
        let mut pi = update();
        pi.algorithm = Some(2);
        pi.laplacian = true;
        pi.pole = 50;
        let config = NodeConfig::from_update(&pi, &runtime(NodeRole::Bridge)).unwrap();
        assert_eq!(config.law, LawKind::PiLowPass);
        assert_eq!(config.consensus, ConsensusTerm::Laplacian);
        assert!((config.gains.pole_coefficient() - 0.5).abs() < 1e-12);
    }
}
