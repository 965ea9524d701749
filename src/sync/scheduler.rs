use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::control::{ControlEngine, ControlOutput};
use crate::core::{Error, NodeStatus, Result, Telemetry};
use crate::network::{Advertiser, NeighborSynchronizer};
use crate::protocol::Advertisement;
use super::snapshot::{Shared, SnapshotCell};

/// Whether the loops are running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Everything one run of the loops needs
pub struct RunParts {
    /// Live parameters; swapping in a new value reconfigures both loops
    pub config: Shared<NodeConfig>,
    /// Engine already reset to its initial conditions
    pub engine: ControlEngine,
    /// Reads the neighbors on every slow tick
    pub synchronizer: NeighborSynchronizer,
    /// Re-advertises the virtual state after every refresh (bridge nodes)
    pub advertiser: Option<Arc<dyn Advertiser>>,
    /// Receives one sample per fast tick
    pub telemetry: mpsc::Sender<Telemetry>,
    /// Time zero of the run's telemetry, taken at the trigger edge
    pub started: Instant,
    /// Published for status polls
    pub status: Shared<NodeStatus>,
    /// Published for the advertisement
    pub output: Shared<ControlOutput>,
}

struct Run {
    cancel: CancellationToken,
    snapshot: SnapshotCell,
    fast: JoinHandle<ControlEngine>,
    _slow: JoinHandle<()>,
}

/// Drives the fast integration loop and the slow neighbor-refresh loop
///
/// The loops share only the neighbor snapshot, which the slow loop replaces
/// whole and the fast loop reads without waiting.
pub struct LoopScheduler {
    run: Option<Run>,
}

impl Default for LoopScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopScheduler {
    pub fn new() -> Self {
        LoopScheduler { run: None }
    }

    pub fn state(&self) -> SchedulerState {
        if self.run.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Snapshot cell of the current run
    pub fn snapshot(&self) -> Option<SnapshotCell> {
        self.run.as_ref().map(|run| run.snapshot.clone())
    }

    /// Spawns both loops with a fresh, all-disabled snapshot
    pub fn start(&mut self, parts: RunParts) -> Result<()> {
        if self.run.is_some() {
            return Err(Error::invalid_state("scheduler already running"));
        }

        let config = parts.config.load();
        let cancel = CancellationToken::new();
        let snapshot = SnapshotCell::with_neighbors(config.neighbors.len());
        let initial = parts.engine.output();
        parts.output.store(initial);
        parts.status.store(NodeStatus {
            vstate: initial.vstate,
            enabled: config.enabled,
        });

        let fast = tokio::spawn(fast_loop(FastLoop {
            engine: parts.engine,
            config: parts.config.clone(),
            snapshot: snapshot.clone(),
            telemetry: parts.telemetry,
            started: parts.started,
            status: parts.status,
            output: parts.output.clone(),
            cancel: cancel.clone(),
        }));
        let slow = tokio::spawn(slow_loop(SlowLoop {
            synchronizer: parts.synchronizer,
            config: parts.config,
            snapshot: snapshot.clone(),
            output: parts.output,
            advertiser: parts.advertiser,
            cancel: cancel.clone(),
        }));

        info!(
            node = %config.node,
            dt_ms = config.dt,
            refresh_ms = config.refresh_period.as_millis() as u64,
            neighbors = config.neighbors.len(),
            "loops started"
        );
        self.run = Some(Run {
            cancel,
            snapshot,
            fast,
            _slow: slow,
        });
        Ok(())
    }

    /// Cancels both loops and returns the engine with its final state
    ///
    /// A neighbor refresh still in flight is left to finish on its own and
    /// its result is discarded.
    pub async fn stop(&mut self) -> Option<ControlEngine> {
        let run = self.run.take()?;
        run.cancel.cancel();
        match run.fast.await {
            Ok(engine) => {
                info!("loops stopped");
                Some(engine)
            }
            Err(e) => {
                warn!(error = %e, "fast loop ended abnormally");
                None
            }
        }
    }
}

fn ticker(period: std::time::Duration, immediate: bool) -> Interval {
    let mut ticker = if immediate {
        interval(period)
    } else {
        interval_at(Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

struct FastLoop {
    engine: ControlEngine,
    config: Shared<NodeConfig>,
    snapshot: SnapshotCell,
    telemetry: mpsc::Sender<Telemetry>,
    started: Instant,
    status: Shared<NodeStatus>,
    output: Shared<ControlOutput>,
    cancel: CancellationToken,
}

async fn fast_loop(mut task: FastLoop) -> ControlEngine {
    let mut applied = task.config.load();
    let mut period = applied.period();
    let mut ticks = ticker(period, true);

    loop {
        tokio::select! {
            biased;
            _ = task.cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        let current = task.config.load();
        if !Arc::ptr_eq(&current, &applied) {
            task.engine.configure(&current);
            if current.period() != period {
                period = current.period();
                ticks = ticker(period, false);
            }
            applied = current;
        }

        let neighbors = task.snapshot.load();
        let out = if applied.enabled {
            task.engine.update(&neighbors)
        } else {
            task.engine.output()
        };
        task.output.store(out);
        task.status.store(NodeStatus {
            vstate: out.vstate,
            enabled: applied.enabled,
        });

        let sample = Telemetry {
            timestamp: task.started.elapsed().as_millis() as u64,
            state: out.state,
            vstate: out.vstate,
            vartheta: out.vartheta,
            neighbor_vstates: neighbors.vstates(),
        };
        match task.telemetry.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(sample)) => {
                debug!(timestamp = sample.timestamp, "telemetry consumer behind, sample dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    task.engine
}

struct SlowLoop {
    synchronizer: NeighborSynchronizer,
    config: Shared<NodeConfig>,
    snapshot: SnapshotCell,
    output: Shared<ControlOutput>,
    advertiser: Option<Arc<dyn Advertiser>>,
    cancel: CancellationToken,
}

async fn slow_loop(mut task: SlowLoop) {
    let mut applied = task.config.load();
    let mut period = applied.refresh_period;
    let mut ticks = ticker(period, true);

    loop {
        tokio::select! {
            biased;
            _ = task.cancel.cancelled() => return,
            _ = ticks.tick() => {}
        }

        let current = task.config.load();
        if !Arc::ptr_eq(&current, &applied) {
            task.synchronizer.reconfigure(&current);
            if current.refresh_period != period {
                period = current.refresh_period;
                ticks = ticker(period, false);
            }
            applied = current;
        }

        let previous = task.snapshot.load();
        let next = task.synchronizer.refresh(&previous).await;
        if task.cancel.is_cancelled() {
            debug!("run stopped during neighbor refresh, result discarded");
            return;
        }
        task.snapshot.store(next);

        if let Some(advertiser) = &task.advertiser {
            let out = task.output.load();
            let payload = Advertisement {
                enabled: applied.enabled,
                node: applied.node,
                state: Some(out.state),
                vstate: out.vstate,
            }
            .encode(applied.advert_layout);
            if let Err(e) = advertiser.publish(payload).await {
                warn!(error = %e, "failed to update advertisement");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::testing::node_config;
    use crate::config::NeighborSpec;
    use crate::core::{NodeId, NodeRole};
    use crate::network::advertiser::fake::RecordingAdvertiser;
    use crate::network::neighbor::fake::TableFetcher;
    use crate::network::DeviceMap;
    use crate::protocol::AdvertLayout;

    struct Harness {
        scheduler: LoopScheduler,
        config: Shared<NodeConfig>,
        fetcher: Arc<TableFetcher>,
        telemetry: mpsc::Receiver<Telemetry>,
        output: Shared<ControlOutput>,
        status: Shared<NodeStatus>,
    }

    fn three_neighbors() -> NodeConfig {
        let mut config = node_config();
        config.neighbors = [2u8, 5, 6]
            .iter()
            .map(|&id| NeighborSpec {
                id: NodeId(id),
                role: NodeRole::Wifi,
                address: Some(format!("http://10.0.0.{}:3004", id)),
            })
            .collect();
        config
    }

    fn start(config: NodeConfig, advertiser: Option<Arc<dyn Advertiser>>) -> Harness {
        let fetcher = Arc::new(TableFetcher::default());
        let (tx, rx) = mpsc::channel(10_000);
        let shared = Shared::new(config.clone());
        let output = Shared::default();
        let status = Shared::default();
        let mut scheduler = LoopScheduler::new();
        scheduler
            .start(RunParts {
                config: shared.clone(),
                engine: ControlEngine::new(&config),
                synchronizer: NeighborSynchronizer::new(&config, fetcher.clone(), DeviceMap::new()),
                advertiser,
                telemetry: tx,
                started: Instant::now(),
                status: status.clone(),
                output: output.clone(),
            })
            .unwrap();
        Harness {
            scheduler,
            config: shared,
            fetcher,
            telemetry: rx,
            output,
            status,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Telemetry>) -> Vec<Telemetry> {
        let mut out = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            out.push(sample);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_length_never_changes() {
        let mut h = start(three_neighbors(), None);
        let cell = h.scheduler.snapshot().unwrap();

        for round in 0..20u8 {
            // Neighbors flap in and out between refreshes
            for id in [2u8, 5, 6] {
                let up = (round + id) % 3 != 0;
                h.fetcher.set(
                    NodeId(id),
                    up.then_some(NodeStatus { vstate: id as i32 * 1000, enabled: true }),
                );
            }
            tokio::time::sleep(Duration::from_millis(35)).await;
            assert_eq!(cell.load().len(), 3);
        }

        let samples = drain(&mut h.telemetry);
        assert!(samples.len() > 50);
        assert!(samples.iter().all(|s| s.neighbor_vstates.len() == 3));
        h.scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_follow_ticks() {
        let mut h = start(node_config(), None);
        tokio::time::sleep(Duration::from_millis(55)).await;
        h.scheduler.stop().await.unwrap();

        let stamps: Vec<u64> = drain(&mut h.telemetry).iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![0, 10, 20, 30, 40, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_updates_after_stop() {
        let mut config = three_neighbors();
        config.initial.vstate = 0;
        let mut h = start(config, None);
        for id in [2u8, 5, 6] {
            h.fetcher.set(NodeId(id), Some(NodeStatus { vstate: 5000, enabled: true }));
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let engine = h.scheduler.stop().await.unwrap();
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert!(engine.output().vstate > 0);
        drain(&mut h.telemetry);
        let frozen = *h.output.load();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(drain(&mut h.telemetry).is_empty());
        assert_eq!(*h.output.load(), frozen);
        assert_eq!(engine.output(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_node_freezes_state() {
        let mut config = node_config();
        config.enabled = false;
        config.disturbance.disturbance_on = true;
        config.disturbance.beta = 1000;
        let initial = config.initial;
        let mut h = start(config, None);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let samples = drain(&mut h.telemetry);
        assert!(samples.len() >= 10);
        assert!(samples.iter().all(|s| s.state == initial.state && s.vstate == initial.vstate));
        assert!(samples.last().unwrap().timestamp >= 90);
        assert!(!h.status.load().enabled);

        // Live re-enable keeps the run going from where it stood
        let mut enabled = (*h.config.load()).clone();
        enabled.enabled = true;
        h.config.store(enabled);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let samples = drain(&mut h.telemetry);
        assert!(samples.last().unwrap().state > initial.state);
        assert!(h.status.load().enabled);
        h.scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_readvertises_vstate() {
        let recorder = Arc::new(RecordingAdvertiser::default());
        let mut config = node_config();
        config.node = NodeId(9);
        config.advert_layout = AdvertLayout::Compact;
        let mut h = start(config.clone(), Some(recorder.clone()));
        tokio::time::sleep(Duration::from_millis(250)).await;
        h.scheduler.stop().await.unwrap();

        let payload = recorder.last_payload().unwrap();
        let adv = Advertisement::decode(&payload, AdvertLayout::Compact).unwrap();
        assert_eq!(adv.node, NodeId(9));
        assert!(adv.enabled);
        assert_eq!(adv.vstate, config.initial.vstate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_rejected() {
        let mut h = start(node_config(), None);
        let config = node_config();
        let (tx, _rx) = mpsc::channel(1);
        let err = h
            .scheduler
            .start(RunParts {
                config: Shared::new(config.clone()),
                engine: ControlEngine::new(&config),
                synchronizer: NeighborSynchronizer::new(&config, h.fetcher.clone(), DeviceMap::new()),
                advertiser: None,
                telemetry: tx,
                started: Instant::now(),
                status: Shared::default(),
                output: Shared::default(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        h.scheduler.stop().await.unwrap();
        assert!(h.scheduler.stop().await.is_none());
    }
}
