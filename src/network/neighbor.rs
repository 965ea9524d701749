use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::{NeighborSpec, NodeConfig};
use crate::core::{Error, NeighborReading, NeighborSnapshot, Result, Transport};
use crate::protocol::{AdvertLayout, Advertisement};
use super::http::StatusFetcher;
use super::radio::DeviceMap;

/// Reads every configured neighbor over its transport
///
/// The snapshot it produces always has one entry per configured neighbor.
pub struct NeighborSynchronizer {
    neighbors: Vec<NeighborSpec>,
    layout: AdvertLayout,
    fetcher: Arc<dyn StatusFetcher>,
    devices: DeviceMap,
}

impl NeighborSynchronizer {
    pub fn new(config: &NodeConfig, fetcher: Arc<dyn StatusFetcher>, devices: DeviceMap) -> Self {
        NeighborSynchronizer {
            neighbors: config.neighbors.clone(),
            layout: config.advert_layout,
            fetcher,
            devices,
        }
    }

    /// Follows a live parameter change; device handles are kept
    pub fn reconfigure(&mut self, config: &NodeConfig) {
        self.neighbors = config.neighbors.clone();
        self.layout = config.advert_layout;
    }

    /// Number of configured neighbors
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Reads all neighbors concurrently
    ///
    /// A neighbor that cannot be read keeps its value from `previous`,
    /// marked disabled, or reads as a disabled zero if it has none.
    pub async fn refresh(&self, previous: &NeighborSnapshot) -> NeighborSnapshot {
        let reads = self.neighbors.iter().enumerate().map(|(index, neighbor)| async move {
            match self.read(neighbor).await {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(neighbor = %neighbor.id, error = %e, "neighbor read failed");
                    previous.get(index).map(NeighborReading::stale).unwrap_or_default()
                }
            }
        });
        NeighborSnapshot::from_readings(join_all(reads).await)
    }

    async fn read(&self, neighbor: &NeighborSpec) -> Result<NeighborReading> {
        match neighbor.transport() {
            Transport::Network => {
                let status = self.fetcher.fetch(neighbor).await?;
                Ok(NeighborReading {
                    vstate: status.vstate,
                    enabled: status.enabled,
                })
            }
            Transport::Radio => {
                let device = self
                    .devices
                    .get(&neighbor.id)
                    .ok_or_else(|| Error::radio(format!("no device handle for neighbor {}", neighbor.id)))?;
                let payload = device.read_payload().await?;
                let adv = Advertisement::decode(&payload, self.layout)?;
                if adv.node != neighbor.id {
                    return Err(Error::protocol(format!(
                        "device for neighbor {} advertises node {}",
                        neighbor.id, adv.node
                    )));
                }
                debug!(neighbor = %neighbor.id, vstate = adv.vstate, "radio neighbor read");
                Ok(NeighborReading {
                    vstate: adv.vstate,
                    enabled: adv.enabled,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    use crate::core::{NodeId, NodeStatus};

    /// Status fetcher answering from a table; missing ids fail
    #[derive(Default)]
    pub struct TableFetcher {
        pub table: Mutex<HashMap<NodeId, NodeStatus>>,
    }

    impl TableFetcher {
        pub fn set(&self, id: NodeId, status: Option<NodeStatus>) {
            let mut table = self.table.lock().unwrap();
            match status {
                Some(status) => table.insert(id, status),
                None => table.remove(&id),
            };
        }
    }

    impl StatusFetcher for TableFetcher {
        fn fetch<'a>(&'a self, neighbor: &'a NeighborSpec) -> BoxFuture<'a, Result<NodeStatus>> {
            let result = self
                .table
                .lock()
                .unwrap()
                .get(&neighbor.id)
                .copied()
                .ok_or_else(|| Error::transport(format!("neighbor {} unreachable", neighbor.id)));
            async move { result }.boxed()
        }
    }
}
