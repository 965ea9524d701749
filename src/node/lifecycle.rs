use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{NodeConfig, ParameterUpdate, RuntimeConfig};
use crate::control::{ControlEngine, ControlOutput};
use crate::core::{Error, NodeRole, NodeStatus, Result, Telemetry};
use crate::network::{
    discover, Advertiser, DeviceMap, DeviceScanner, DiscoveryConfig, NeighborSynchronizer, StatusFetcher,
};
use crate::protocol::Advertisement;
use crate::sync::{LoopScheduler, RunParts, Shared, SnapshotCell};
use super::serial_link::SerialSession;

/// Where the node stands between parameter updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No update accepted yet
    Idle,
    /// Parameters applied, not running
    Configured,
    /// Trigger set, loops running
    Running,
}

/// External collaborators of one node
pub struct NodeContext {
    pub runtime: RuntimeConfig,
    /// Reads network neighbors
    pub fetcher: Arc<dyn StatusFetcher>,
    /// Finds radio neighbors (bridge nodes)
    pub scanner: Option<Arc<dyn DeviceScanner>>,
    /// Radio advertising session (bridge nodes)
    pub advertiser: Option<Arc<dyn Advertiser>>,
    /// Link to the microcontroller (ble nodes)
    pub serial: Option<SerialSession>,
    /// Telemetry consumer; full channels drop samples
    pub telemetry: mpsc::Sender<Telemetry>,
}

/// Per-node owner of the control loops
///
/// Parameter updates are the only input. A rising trigger starts a fresh
/// run, a falling one stops it, anything else retunes in place.
pub struct NodeLifecycle {
    context: NodeContext,
    state: LifecycleState,
    config: Option<Shared<NodeConfig>>,
    scheduler: LoopScheduler,
    status: Shared<NodeStatus>,
    output: Shared<ControlOutput>,
    cancel: CancellationToken,
}

impl NodeLifecycle {
    pub fn new(context: NodeContext) -> Self {
        NodeLifecycle {
            context,
            state: LifecycleState::Idle,
            config: None,
            scheduler: LoopScheduler::new(),
            status: Shared::default(),
            output: Shared::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn role(&self) -> NodeRole {
        self.context.runtime.role
    }

    /// Status answered to neighbor polls
    pub fn status_handle(&self) -> Shared<NodeStatus> {
        self.status.clone()
    }

    /// Token that aborts a pending discovery when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Parameters currently in force
    pub fn config(&self) -> Option<Arc<NodeConfig>> {
        self.config.as_ref().map(Shared::load)
    }

    /// Neighbor snapshot of the current run
    pub fn snapshot(&self) -> Option<SnapshotCell> {
        self.scheduler.snapshot()
    }

    /// Validates and applies one parameter update
    ///
    /// A rejected update leaves the node exactly as it was.
    pub async fn apply(&mut self, update: &ParameterUpdate) -> Result<LifecycleState> {
        let next = match NodeConfig::from_update(update, &self.context.runtime) {
            Ok(config) => config,
            Err(e) => {
                warn!(node = %update.node, error = %e, "parameter update rejected");
                return Err(e);
            }
        };

        if !next.role.runs_local_engine() {
            return self.apply_serial(next).await;
        }

        let running = self.state == LifecycleState::Running;
        match (running, next.trigger) {
            (false, true) => self.start_run(next).await?,
            (true, false) => self.stop_run(next).await,
            _ => self.reconfigure(next),
        }
        Ok(self.state)
    }

    /// Stops everything; the node returns to `Configured` if it was running
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if self.state == LifecycleState::Running {
            self.scheduler.stop().await;
            self.stop_advertising().await;
            self.state = LifecycleState::Configured;
        }
    }

    async fn start_run(&mut self, config: NodeConfig) -> Result<()> {
        info!(node = %config.node, role = %config.role, law = ?config.law, "trigger set, starting run");
        // Telemetry time counts from the trigger, so discovery time shows up
        // in the first timestamp
        let started = Instant::now();
        let bridge = config.role == NodeRole::Bridge;

        let engine = ControlEngine::new(&config);
        let initial = engine.output();

        let advertiser = match (&self.context.advertiser, bridge) {
            (Some(advertiser), true) => {
                let payload = Advertisement {
                    enabled: config.enabled,
                    node: config.node,
                    state: Some(initial.state),
                    vstate: initial.vstate,
                }
                .encode(config.advert_layout);
                advertiser.start(payload).await?;
                Some(Arc::clone(advertiser))
            }
            _ => None,
        };

        let devices = match self.discover_radio_neighbors(&config).await {
            Ok(devices) => devices,
            Err(e) => {
                error!(node = %config.node, error = %e, "radio discovery failed, run not started");
                self.stop_advertising().await;
                self.config = Some(Shared::new(config));
                self.state = LifecycleState::Configured;
                return Err(e);
            }
        };

        let synchronizer = NeighborSynchronizer::new(&config, Arc::clone(&self.context.fetcher), devices);
        let shared = Shared::new(config);
        self.scheduler.start(RunParts {
            config: shared.clone(),
            engine,
            synchronizer,
            advertiser,
            telemetry: self.context.telemetry.clone(),
            started,
            status: self.status.clone(),
            output: self.output.clone(),
        })?;

        self.config = Some(shared);
        self.state = LifecycleState::Running;
        Ok(())
    }

    async fn stop_run(&mut self, config: NodeConfig) {
        info!(node = %config.node, "trigger cleared, stopping run");
        self.scheduler.stop().await;
        if config.role == NodeRole::Bridge {
            self.stop_advertising().await;
        }
        self.publish_idle_status(&config);
        self.config = Some(Shared::new(config));
        self.state = LifecycleState::Configured;
    }

    fn reconfigure(&mut self, config: NodeConfig) {
        if self.state == LifecycleState::Running {
            if let Some(shared) = &self.config {
                info!(node = %config.node, "retuning running node");
                shared.store(config);
                return;
            }
        }
        info!(node = %config.node, "parameters applied");
        self.publish_idle_status(&config);
        self.config = Some(Shared::new(config));
        self.state = LifecycleState::Configured;
    }

    async fn apply_serial(&mut self, config: NodeConfig) -> Result<LifecycleState> {
        let session = self
            .context
            .serial
            .as_mut()
            .ok_or_else(|| Error::invalid_state("ble node has no serial link"))?;
        session.apply(&config).await?;

        self.state = if config.trigger {
            LifecycleState::Running
        } else {
            LifecycleState::Configured
        };
        self.config = Some(Shared::new(config));
        Ok(self.state)
    }

    async fn discover_radio_neighbors(&self, config: &NodeConfig) -> Result<DeviceMap> {
        let required: Vec<_> = config.radio_neighbors().map(|n| n.id).collect();
        if required.is_empty() {
            return Ok(DeviceMap::new());
        }
        let Some(scanner) = &self.context.scanner else {
            warn!(?required, "no radio scanner available, radio neighbors stay disabled");
            return Ok(DeviceMap::new());
        };
        let discovery = DiscoveryConfig::from_runtime(&self.context.runtime);
        discover(scanner.as_ref(), &required, &discovery, &self.cancel).await
    }

    async fn stop_advertising(&self) {
        if self.role() != NodeRole::Bridge {
            return;
        }
        if let Some(advertiser) = &self.context.advertiser {
            if let Err(e) = advertiser.stop().await {
                warn!(error = %e, "failed to stop advertising");
            }
        }
    }

    fn publish_idle_status(&self, config: &NodeConfig) {
        let vstate = match self.state {
            LifecycleState::Idle => config.initial.vstate,
            _ => self.output.load().vstate,
        };
        self.status.store(NodeStatus {
            vstate,
            enabled: config.enabled,
        });
    }
}
