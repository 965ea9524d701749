//! Configuration
//!
//! Two layers: [`RuntimeConfig`] is fixed for the life of the process and
//! read from TOML, while [`ParameterUpdate`]s arrive during operation and are
//! validated into a [`NodeConfig`] per run.

mod node;
mod update;

pub use self::node::{LawGains, NeighborSpec, NodeConfig};
pub use self::update::{DisturbanceParams, ParameterUpdate};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::control::{DEFAULT_EPSILON_OFF, DEFAULT_EPSILON_ON};
use crate::core::serde::{deserialize_millis, deserialize_opt_millis, serialize_millis, serialize_opt_millis};
use crate::core::{NodeRole, Result, DEVICE_NAME, MANUFACTURER_ID};
use crate::protocol::{AdvertLayout, SERIAL_CHUNK_SIZE};

/// Status port of wifi nodes
pub const WIFI_STATUS_PORT: u16 = 3004;

/// Status port of bridge nodes
pub const BRIDGE_STATUS_PORT: u16 = 3005;

/// Per-process settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Role of this node
    pub role: NodeRole,
    /// Serial device of the attached microcontroller
    pub serial_device: String,
    pub baud_rate: u32,
    /// Pause after every serial write
    #[serde(serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub serial_write_delay: Duration,
    /// Largest single serial write
    pub serial_chunk_size: usize,
    /// Slow-loop period
    #[serde(serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub network_refresh_interval: Duration,
    /// Per-request timeout of neighbor status polls
    #[serde(serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub fetch_timeout: Duration,
    /// Path of the status endpoint on every node
    pub status_path: String,
    /// Bind address of the status endpoint; role port on all interfaces when unset
    pub status_addr: Option<SocketAddr>,
    /// Advertising helper, launched with the initial payload
    pub advertise_command: String,
    pub manufacturer_id: u16,
    /// Name advertised by testbed radio boards
    pub device_name: String,
    #[serde(serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub discovery_retry_delay: Duration,
    /// Discovery gives up after this many scans; unbounded when unset
    pub discovery_max_attempts: Option<u32>,
    /// Advertiser is not restarted more than this; unbounded when unset
    pub advertiser_max_restarts: Option<u32>,
    /// Pause before restarting a crashed advertiser
    #[serde(
        serialize_with = "serialize_opt_millis",
        deserialize_with = "deserialize_opt_millis"
    )]
    pub advertiser_restart_delay: Option<Duration>,
    pub advert_layout: AdvertLayout,
    pub epsilon_on: f64,
    pub epsilon_off: f64,
    /// Telemetry samples buffered before new ones are dropped
    pub telemetry_capacity: usize,
    /// Seed of the disturbance noise
    pub rng_seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            role: NodeRole::Wifi,
            serial_device: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            serial_write_delay: Duration::from_millis(500),
            serial_chunk_size: SERIAL_CHUNK_SIZE,
            network_refresh_interval: Duration::from_millis(100),
            fetch_timeout: Duration::from_millis(1000),
            status_path: "/getVState".to_string(),
            status_addr: None,
            advertise_command: "./bleadv.sh".to_string(),
            manufacturer_id: MANUFACTURER_ID,
            device_name: DEVICE_NAME.to_string(),
            discovery_retry_delay: Duration::from_millis(1000),
            discovery_max_attempts: None,
            advertiser_max_restarts: None,
            advertiser_restart_delay: None,
            advert_layout: AdvertLayout::default(),
            epsilon_on: DEFAULT_EPSILON_ON,
            epsilon_off: DEFAULT_EPSILON_OFF,
            telemetry_capacity: 1024,
            rng_seed: None,
        }
    }
}

impl RuntimeConfig {
    /// Reads a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parses TOML text; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Address the status endpoint listens on
    pub fn status_bind_addr(&self) -> SocketAddr {
        self.status_addr.unwrap_or_else(|| {
            let port = match self.role {
                NodeRole::Bridge => BRIDGE_STATUS_PORT,
                _ => WIFI_STATUS_PORT,
            };
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
        })
    }
}
