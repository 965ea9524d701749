use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::core::{Error, NodeId, Result};
use crate::protocol::Advertisement;

/// Handle to a radio board found by a scan
pub trait RadioDevice: Send + Sync {
    /// Advertised local name, if any
    fn name(&self) -> Option<String>;

    /// Reads the manufacturer data currently advertised by the board
    fn read_payload(&self) -> BoxFuture<'_, Result<Bytes>>;
}

/// Scans for nearby radio boards
pub trait DeviceScanner: Send + Sync {
    fn scan(&self) -> BoxFuture<'_, Result<Vec<Arc<dyn RadioDevice>>>>;
}

/// Devices found by discovery, keyed by the node they advertise
pub type DeviceMap = HashMap<NodeId, Arc<dyn RadioDevice>>;

/// Settings for radio neighbor discovery
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Only devices advertising this name are considered
    pub device_name: String,
    /// Pause between scans
    pub retry_delay: Duration,
    /// Give up after this many scans; retry forever when `None`
    pub max_attempts: Option<u32>,
}

impl DiscoveryConfig {
    pub fn from_runtime(runtime: &RuntimeConfig) -> Self {
        DiscoveryConfig {
            device_name: runtime.device_name.clone(),
            retry_delay: runtime.discovery_retry_delay,
            max_attempts: runtime.discovery_max_attempts,
        }
    }
}

/// Scans until every node in `required` has been matched to a device
pub async fn discover(
    scanner: &dyn DeviceScanner,
    required: &[NodeId],
    config: &DiscoveryConfig,
    cancel: &CancellationToken,
) -> Result<DeviceMap> {
    let mut found = DeviceMap::new();
    let mut attempt = 0u32;

    while !required.iter().all(|id| found.contains_key(id)) {
        attempt += 1;
        match scanner.scan().await {
            Ok(devices) => {
                for device in devices {
                    if device.name().as_deref() != Some(config.device_name.as_str()) {
                        continue;
                    }
                    let payload = match device.read_payload().await {
                        Ok(payload) => payload,
                        Err(e) => {
                            debug!(error = %e, "could not read candidate device");
                            continue;
                        }
                    };
                    if let Some(node) = Advertisement::peek_node(&payload) {
                        if required.contains(&node) && !found.contains_key(&node) {
                            info!(neighbor = %node, "radio neighbor found");
                            found.insert(node, device);
                        }
                    }
                }
            }
            Err(e) => warn!(attempt, error = %e, "radio scan failed"),
        }

        if required.iter().all(|id| found.contains_key(id)) {
            break;
        }

        let missing: Vec<NodeId> = required.iter().filter(|id| !found.contains_key(id)).copied().collect();
        if config.max_attempts.map_or(false, |max| attempt >= max) {
            return Err(Error::radio(format!(
                "radio neighbors {:?} not found after {} scans",
                missing, attempt
            )));
        }
        debug!(attempt, ?missing, "radio neighbors still missing, rescanning");

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::invalid_state("discovery cancelled")),
            _ = tokio::time::sleep(config.retry_delay) => {}
        }
    }

    Ok(found)
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeDevice, FakeScanner};
    use super::*;
    use crate::protocol::AdvertLayout;

    fn board(node: u8) -> Arc<dyn RadioDevice> {
        let adv = Advertisement {
            enabled: true,
            node: NodeId(node),
            state: Some(0),
            vstate: 0,
        };
        FakeDevice::advertising(adv.encode(AdvertLayout::Full))
    }

    fn config(max_attempts: Option<u32>) -> DiscoveryConfig {
        DiscoveryConfig {
            device_name: "LABCTRL".to_string(),
            retry_delay: Duration::from_millis(1000),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescans_until_all_found() {
        let stranger: Arc<dyn RadioDevice> = Arc::new(FakeDevice {
            name: Some("headphones".to_string()),
            payload: std::sync::Mutex::new(Ok(Bytes::from_static(&[127, 2]))),
        });
        let scanner = FakeScanner::new(vec![
            vec![board(4), stranger],
            vec![],
            vec![board(4), board(7)],
        ]);

        let found = discover(&scanner, &[NodeId(4), NodeId(7)], &config(None), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains_key(&NodeId(7)));
        assert_eq!(scanner.scans(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_attempts() {
        let scanner = FakeScanner::new(vec![vec![board(4)]]);
        let result = discover(&scanner, &[NodeId(4), NodeId(9)], &config(Some(3)), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Radio(_))));
        assert_eq!(scanner.scans(), 3);
    }

    #[tokio::test]
    async fn test_nothing_required_returns_immediately() {
        let scanner = FakeScanner::new(vec![]);
        let found = discover(&scanner, &[], &config(Some(1)), &CancellationToken::new()).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(scanner.scans(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_retrying() {
        let scanner = FakeScanner::new(vec![vec![]]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = discover(&scanner, &[NodeId(1)], &config(None), &cancel).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }
}
