use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RuntimeConfig;
use crate::core::{Error, Result};
use crate::protocol::hex_bytes;

/// Radio advertising session owned by a bridge node
pub trait Advertiser: Send + Sync {
    /// Starts advertising `payload`, replacing any running session
    fn start(&self, payload: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Changes the advertised payload
    fn publish(&self, payload: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Ends the session
    fn stop(&self) -> BoxFuture<'_, Result<()>>;
}

/// Settings of the advertising helper process
#[derive(Debug, Clone)]
pub struct AdvertiserConfig {
    /// Program launched with the hex payload as its only argument
    pub command: String,
    /// Company id prefixed to every manufacturer-data update
    pub manufacturer_id: u16,
    /// Restarts allowed after crashes; unbounded when `None`
    pub max_restarts: Option<u32>,
    /// Pause before a restart; immediate when `None`
    pub restart_delay: Option<Duration>,
}

impl AdvertiserConfig {
    pub fn from_runtime(runtime: &RuntimeConfig) -> Self {
        AdvertiserConfig {
            command: runtime.advertise_command.clone(),
            manufacturer_id: runtime.manufacturer_id,
            max_restarts: runtime.advertiser_max_restarts,
            restart_delay: runtime.advertiser_restart_delay,
        }
    }
}

/// Pause before relaunching a helper that could not be spawned at all
pub const LAUNCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Line written to the helper's stdin to change the manufacturer data
pub fn command_line(manufacturer_id: u16, payload: &[u8]) -> String {
    format!("manufacturer 0x{:04x} {}\r", manufacturer_id, hex_bytes(payload))
}

struct Session {
    payload: watch::Sender<Bytes>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Advertiser backed by a supervised helper process
///
/// The helper is relaunched with the latest payload whenever it exits with
/// a failure status.
pub struct ProcessAdvertiser {
    config: AdvertiserConfig,
    session: Mutex<Option<Session>>,
    launches: Arc<AtomicU32>,
}

impl ProcessAdvertiser {
    pub fn new(config: AdvertiserConfig) -> Self {
        ProcessAdvertiser {
            config,
            session: Mutex::new(None),
            launches: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of helper launches attempted so far
    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::Relaxed)
    }

    async fn shutdown(session: Session) {
        session.cancel.cancel();
        if let Err(e) = session.task.await {
            error!(error = %e, "advertiser supervisor panicked");
        }
    }
}

impl Advertiser for ProcessAdvertiser {
    fn start(&self, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        async move {
            let mut session = self.session.lock().await;
            if let Some(old) = session.take() {
                Self::shutdown(old).await;
            }

            let (tx, rx) = watch::channel(payload);
            let cancel = CancellationToken::new();
            let task = tokio::spawn(supervise(
                self.config.clone(),
                rx,
                cancel.clone(),
                Arc::clone(&self.launches),
            ));
            *session = Some(Session { payload: tx, cancel, task });
            Ok(())
        }
        .boxed()
    }

    fn publish(&self, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        async move {
            let session = self.session.lock().await;
            let session = session
                .as_ref()
                .ok_or_else(|| Error::invalid_state("advertiser not started"))?;
            session.payload.send_replace(payload);
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            if let Some(session) = self.session.lock().await.take() {
                Self::shutdown(session).await;
                info!("advertising stopped");
            }
            Ok(())
        }
        .boxed()
    }
}

enum SessionEnd {
    Cancelled,
    Exited(ExitStatus),
}

async fn supervise(
    config: AdvertiserConfig,
    mut payload: watch::Receiver<Bytes>,
    cancel: CancellationToken,
    launches: Arc<AtomicU32>,
) {
    let mut restarts = 0u32;
    loop {
        launches.fetch_add(1, Ordering::Relaxed);
        let initial = payload.borrow_and_update().clone();

        // A spawn failure returns without awaiting anything, so it always
        // waits before the next attempt
        let delay = match run_once(&config, &initial, &mut payload, &cancel).await {
            Ok(SessionEnd::Cancelled) => return,
            Ok(SessionEnd::Exited(status)) if status.success() => {
                info!(command = %config.command, "advertiser exited");
                return;
            }
            Ok(SessionEnd::Exited(status)) => {
                warn!(command = %config.command, %status, "advertiser exited, restarting");
                config.restart_delay
            }
            Err(e) => {
                warn!(command = %config.command, error = %e, "advertiser failed, restarting");
                Some(config.restart_delay.unwrap_or(LAUNCH_RETRY_DELAY))
            }
        };

        restarts += 1;
        if config.max_restarts.map_or(false, |max| restarts > max) {
            error!(command = %config.command, restarts = restarts - 1, "advertiser restart limit reached");
            return;
        }

        match delay {
            Some(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                if cancel.is_cancelled() {
                    return;
                }
                tokio::task::yield_now().await;
            }
        }
    }
}

async fn run_once(
    config: &AdvertiserConfig,
    initial: &Bytes,
    payload: &mut watch::Receiver<Bytes>,
    cancel: &CancellationToken,
) -> Result<SessionEnd> {
    let mut child = Command::new(&config.command)
        .arg(hex_bytes(initial))
        .stdin(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::radio(format!("failed to launch {}: {}", config.command, e)))?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::radio("advertiser stdin unavailable"))?;
    debug!(command = %config.command, payload = %hex_bytes(initial), "advertiser launched");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                child.kill().await?;
                return Ok(SessionEnd::Cancelled);
            }
            status = child.wait() => return Ok(SessionEnd::Exited(status?)),
            changed = payload.changed() => {
                if changed.is_err() {
                    child.kill().await?;
                    return Ok(SessionEnd::Cancelled);
                }
                let line = command_line(config.manufacturer_id, &payload.borrow_and_update());
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await?;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Records every call for inspection
    #[derive(Default)]
    pub struct RecordingAdvertiser {
        pub events: StdMutex<Vec<String>>,
        pub payloads: StdMutex<Vec<Bytes>>,
    }

    impl RecordingAdvertiser {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        pub fn last_payload(&self) -> Option<Bytes> {
            self.payloads.lock().unwrap().last().cloned()
        }
    }

    impl Advertiser for RecordingAdvertiser {
        fn start(&self, payload: Bytes) -> BoxFuture<'_, Result<()>> {
            self.events.lock().unwrap().push("start".to_string());
            self.payloads.lock().unwrap().push(payload);
            async { Ok(()) }.boxed()
        }

        fn publish(&self, payload: Bytes) -> BoxFuture<'_, Result<()>> {
            self.payloads.lock().unwrap().push(payload);
            async { Ok(()) }.boxed()
        }

        fn stop(&self) -> BoxFuture<'_, Result<()>> {
            self.events.lock().unwrap().push("stop".to_string());
            async { Ok(()) }.boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_format() {
        assert_eq!(
            command_line(0x0059, &[0x7f, 0x05, 0xff]),
            "manufacturer 0x0059 0x7f 0x05 0xff\r"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_are_bounded() {
        let advertiser = ProcessAdvertiser::new(AdvertiserConfig {
            command: "/nonexistent/bleadv-helper".to_string(),
            manufacturer_id: 0x0059,
            max_restarts: Some(2),
            restart_delay: Some(Duration::from_millis(10)),
        });
        advertiser.start(Bytes::from_static(&[127, 1])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(advertiser.launches(), 3);
        advertiser.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_helper_does_not_starve_runtime() {
        // Current-thread runtime: a restart loop that never yields would
        // keep the sleep below from ever completing
        let advertiser = ProcessAdvertiser::new(AdvertiserConfig {
            command: "/nonexistent/bleadv-helper".to_string(),
            manufacturer_id: 0x0059,
            max_restarts: None,
            restart_delay: None,
        });
        advertiser.start(Bytes::from_static(&[127, 1])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(advertiser.launches(), 1);
        tokio::time::timeout(Duration::from_secs(5), advertiser.stop())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_helper_retries_on_launch_delay() {
        let advertiser = ProcessAdvertiser::new(AdvertiserConfig {
            command: "/nonexistent/bleadv-helper".to_string(),
            manufacturer_id: 0x0059,
            max_restarts: None,
            restart_delay: None,
        });
        advertiser.start(Bytes::from_static(&[127, 1])).await.unwrap();
        tokio::time::sleep(LAUNCH_RETRY_DELAY * 3 + Duration::from_millis(500)).await;

        assert_eq!(advertiser.launches(), 4);
        advertiser.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_requires_session() {
        let advertiser = ProcessAdvertiser::new(AdvertiserConfig {
            command: "true".to_string(),
            manufacturer_id: 0x0059,
            max_restarts: Some(0),
            restart_delay: None,
        });
        let err = advertiser.publish(Bytes::from_static(&[0])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        // Stopping an idle advertiser is a no-op
        advertiser.stop().await.unwrap();
    }
}
