use std::fmt;

use serde::{Serialize, Deserialize};

/// Identifier of a node in the testbed (fits the one-byte advertisement field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u8);

impl NodeId {
    /// Returns the raw id
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport role a node plays in the testbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Control law runs on an attached microcontroller reached over serial;
    /// the board itself talks to its neighbors by radio advertising
    Ble,
    /// Control law runs locally; neighbors are polled over the local network
    Wifi,
    /// Like `Wifi`, but also observes radio neighbors and re-advertises its
    /// own virtual state over radio
    Bridge,
}

impl NodeRole {
    /// How other nodes reach a node of this role
    pub fn transport(&self) -> Transport {
        match self {
            NodeRole::Ble => Transport::Radio,
            NodeRole::Wifi | NodeRole::Bridge => Transport::Network,
        }
    }

    /// Whether the control law runs in this process
    pub fn runs_local_engine(&self) -> bool {
        !matches!(self, NodeRole::Ble)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeRole::Ble => "ble",
            NodeRole::Wifi => "wifi",
            NodeRole::Bridge => "bridge",
        };
        f.write_str(name)
    }
}

/// Path used to reach a neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Radio advertisement observed through a device handle
    Radio,
    /// Request/response status poll over the local network
    Network,
}

/// Last known consensus data of one neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NeighborReading {
    /// Neighbor's virtual state (fixed-point)
    pub vstate: i32,
    /// Whether the neighbor takes part in the consensus
    pub enabled: bool,
}

impl NeighborReading {
    /// Keeps the value but marks it as not usable this cycle
    pub fn stale(&self) -> Self {
        NeighborReading {
            vstate: self.vstate,
            enabled: false,
        }
    }
}

/// Neighbor readings index-aligned with the configured neighbor list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NeighborSnapshot {
    readings: Vec<NeighborReading>,
}

impl NeighborSnapshot {
    /// Snapshot of `len` disabled neighbors
    pub fn disabled(len: usize) -> Self {
        NeighborSnapshot {
            readings: vec![NeighborReading::default(); len],
        }
    }

    /// Builds a snapshot from complete readings
    pub fn from_readings(readings: Vec<NeighborReading>) -> Self {
        NeighborSnapshot { readings }
    }

    /// Number of neighbors covered
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether there are no neighbors
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Reading at `index`
    pub fn get(&self, index: usize) -> Option<&NeighborReading> {
        self.readings.get(index)
    }

    /// Iterates over the readings in neighbor order
    pub fn iter(&self) -> impl Iterator<Item = &NeighborReading> {
        self.readings.iter()
    }

    /// Neighbor virtual states in neighbor order
    pub fn vstates(&self) -> Vec<i32> {
        self.readings.iter().map(|r| r.vstate).collect()
    }
}

/// One sample emitted per fast-loop tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    /// Milliseconds since the trigger started the run
    pub timestamp: u64,
    pub state: i32,
    pub vstate: i32,
    pub vartheta: i32,
    /// Neighbor virtual states seen when the sample was taken
    #[serde(rename = "neighborVStates")]
    pub neighbor_vstates: Vec<i32>,
}

/// What a node answers to a neighbor status poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    pub vstate: i32,
    pub enabled: bool,
}
