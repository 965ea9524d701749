use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{NodeConfig, RuntimeConfig};
use crate::core::{Error, Result, Telemetry};
use crate::protocol::codec::drain_telemetry;
use crate::protocol::{SerialCodec, SerialFrame};

/// Read timeout of the serial port; reads that time out are retried
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens the microcontroller port, returning its write and read halves
pub fn open_port(runtime: &RuntimeConfig) -> Result<(Box<dyn Write + Send>, Box<dyn Read + Send>)> {
    let port = serialport::new(&runtime.serial_device, runtime.baud_rate)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| Error::serial(format!("failed to open {}: {}", runtime.serial_device, e)))?;
    let reader = port
        .try_clone()
        .map_err(|e| Error::serial(format!("failed to clone {}: {}", runtime.serial_device, e)))?;
    info!(device = %runtime.serial_device, baud = runtime.baud_rate, "serial port open");
    Ok((Box::new(port), Box::new(reader)))
}

/// Outbound half of the microcontroller link
///
/// The firmware has a small receive buffer, so every frame is written in
/// chunks and each chunk is followed by a flush and a pause. Writes run on
/// the blocking pool.
pub struct SerialSession {
    /// Absent only while a write is in flight, or after a write task panicked
    writer: Option<Box<dyn Write + Send>>,
    chunk_size: usize,
    delay: Duration,
    trigger: bool,
}

impl SerialSession {
    pub fn new(writer: Box<dyn Write + Send>, chunk_size: usize, delay: Duration) -> Self {
        SerialSession {
            writer: Some(writer),
            chunk_size: chunk_size.max(1),
            delay,
            trigger: false,
        }
    }

    pub fn from_runtime(writer: Box<dyn Write + Send>, runtime: &RuntimeConfig) -> Self {
        Self::new(writer, runtime.serial_chunk_size, runtime.serial_write_delay)
    }

    /// Writes one frame
    pub async fn send(&mut self, frame: &SerialFrame) -> Result<()> {
        let line = frame.to_line();
        debug!(frame = %frame, "serial write");
        for chunk in line.as_bytes().chunks(self.chunk_size) {
            self.write_chunk(chunk.to_vec()).await?;
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| Error::invalid_state("serial writer lost"))?;
        let (writer, written) = tokio::task::spawn_blocking(move || {
            let written = writer.write_all(&chunk).and_then(|_| writer.flush());
            (writer, written)
        })
        .await
        .map_err(|e| Error::serial(format!("write task failed: {}", e)))?;
        self.writer = Some(writer);
        written.map_err(|e| Error::serial(format!("write failed: {}", e)))
    }

    /// Forwards a full parameter set; the trigger goes out only when it changes
    pub async fn apply(&mut self, config: &NodeConfig) -> Result<()> {
        self.send(&SerialFrame::Network {
            enabled: config.enabled,
            node: config.node,
            neighbors: config.neighbor_ids(),
        })
        .await?;
        self.send(&SerialFrame::Consensus {
            clock: config.clock,
            dt: config.dt,
            state: config.initial.state,
            vstate: config.initial.vstate,
            vartheta: config.initial.vartheta,
            eta: config.eta,
        })
        .await?;
        self.send(&SerialFrame::Disturbance(config.disturbance)).await?;

        if config.trigger != self.trigger {
            tokio::time::sleep(self.delay).await;
            self.send(&SerialFrame::Trigger(config.trigger)).await?;
            self.trigger = config.trigger;
            info!(node = %config.node, trigger = config.trigger, "trigger forwarded to microcontroller");
        }
        Ok(())
    }
}

/// Relays `d` lines from the microcontroller as telemetry
///
/// Runs on the blocking pool until the port closes or fails, or the
/// telemetry receiver goes away. Samples are dropped while the receiver
/// is full.
pub fn spawn_reader(mut reader: Box<dyn Read + Send>, telemetry: mpsc::Sender<Telemetry>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut codec = SerialCodec::new();
        let mut buf = BytesMut::with_capacity(1024);
        let mut chunk = [0u8; 256];

        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => {
                    info!("serial port closed");
                    return;
                }
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => continue,
                Err(e) => {
                    warn!(error = %e, "serial read failed");
                    return;
                }
            };
            buf.extend_from_slice(&chunk[..n]);

            let samples = match drain_telemetry(&mut codec, &mut buf) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(error = %e, "serial decode failed");
                    continue;
                }
            };
            for sample in samples {
                match telemetry.try_send(sample) {
                    Ok(()) => {}
                    Err(TrySendError::Full(sample)) => {
                        debug!(timestamp = sample.timestamp, "telemetry consumer behind, sample dropped");
                    }
                    Err(TrySendError::Closed(_)) => return,
                }
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod fake {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// Writer recording every write call separately
    #[derive(Clone, Default)]
    pub struct RecordingWriter {
        pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl RecordingWriter {
        pub fn text(&self) -> String {
            let writes = self.writes.lock().unwrap();
            String::from_utf8(writes.concat()).unwrap()
        }

        pub fn write_sizes(&self) -> Vec<usize> {
            self.writes.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
