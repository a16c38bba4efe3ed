use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::client::{BubbleStream, StreamConfig, StreamEvent};
use crate::config::CameraConfig;
use crate::framer::NalUnit;
use crate::lifecycle::Terminal;

/// Errors raised by the node's output sink
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to open output {path}: {source}")]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a node did before it stopped
#[derive(Debug)]
pub struct NodeStats {
    pub units: u64,
    pub bytes: u64,
    /// Set when the camera connection ended on its own
    pub terminal: Option<Terminal>,
}

struct Output {
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
}

impl Output {
    async fn open(path: PathBuf) -> Result<Self, NodeError> {
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| NodeError::OpenOutput {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Write one Annex-B unit and flush so a downstream reader sees it immediately
    async fn write(&mut self, unit: &NalUnit) -> Result<(), NodeError> {
        write_unit(&mut self.writer, unit)
            .await
            .map_err(|source| NodeError::WriteOutput {
                path: self.path.clone(),
                source,
            })
    }
}

async fn write_unit(
    writer: &mut BufWriter<tokio::fs::File>,
    unit: &NalUnit,
) -> std::io::Result<()> {
    writer.write_all(unit.as_slice()).await?;
    writer.flush().await
}

/// Bubble camera node - streams one camera and forwards NAL units to its output
pub struct BubbleCameraNode {
    camera_config: CameraConfig,
    stream_config: StreamConfig,
    // Stats
    units: u64,
    bytes: u64,
    last_log: Instant,
    logged_units: u64,
}

impl BubbleCameraNode {
    pub fn new(camera_config: CameraConfig, stream_config: StreamConfig) -> Self {
        Self {
            camera_config,
            stream_config,
            units: 0,
            bytes: 0,
            last_log: Instant::now(),
            logged_units: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.camera_config.name
    }

    fn record(&mut self, unit: &NalUnit) {
        self.units += 1;
        self.bytes += unit.len() as u64;

        // Log stats every second
        if self.last_log.elapsed().as_secs() >= 1 {
            log::info!(
                "[{}] {} units/s, {} total ({} bytes)",
                self.camera_config.name,
                self.units - self.logged_units,
                self.units,
                self.bytes
            );
            self.logged_units = self.units;
            self.last_log = Instant::now();
        }
    }

    /// Run until shutdown or until the camera connection terminates.
    ///
    /// There is no reconnect: a terminal event ends the node and is returned
    /// in [`NodeStats::terminal`].
    pub async fn run(
        mut self,
        shutdown_tx: tokio::sync::watch::Sender<()>,
    ) -> Result<NodeStats, NodeError> {
        let mut shutdown_rx = shutdown_tx.subscribe();

        let mut output = match self.camera_config.output.clone() {
            Some(path) => {
                log::info!(
                    "[{}] Writing Annex-B stream to {}",
                    self.camera_config.name,
                    path.display()
                );
                Some(Output::open(path).await?)
            }
            None => None,
        };

        log::info!(
            "Camera '{}' streaming from {}:{}",
            self.camera_config.name,
            self.stream_config.host,
            self.stream_config.port
        );

        let stream = BubbleStream::connect(self.stream_config.clone());
        let mut terminal = None;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,

                event = stream.events().recv_async() => match event {
                    Ok(StreamEvent::Nal(unit)) => {
                        if let Some(output) = output.as_mut() {
                            output.write(&unit).await?;
                        }
                        self.record(&unit);
                    }
                    Ok(StreamEvent::Terminal(reason)) => {
                        log::warn!("[{}] Stream ended: {}", self.camera_config.name, reason);
                        terminal = Some(reason);
                        break;
                    }
                    Err(_) => break,
                },
            }
        }

        log::info!("Shutting down camera '{}'...", self.camera_config.name);
        stream.shutdown().await;

        Ok(NodeStats {
            units: self.units,
            bytes: self.bytes,
            terminal,
        })
    }
}
