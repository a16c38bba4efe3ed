//! Bubble stream client.
//!
//! Each [`BubbleStream`] owns one tokio task holding the socket, the receive
//! buffer and the closed flag. Units are delivered in arrival order over a
//! bounded channel, followed by at most one terminal event:
//! ```text
//! Nal(0) Nal(1) ... Nal(n) Terminal(reason)
//! ```
//! A slow consumer stalls reads on this connection only.

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::BubbleError;
use crate::framer::{NalFramer, NalUnit};
use crate::handshake::{wait_until, Handshake, HandshakeTiming};
use crate::lifecycle::{Lifecycle, Terminal};
use crate::protocol::{Credentials, AUTH_HEADER, DEFAULT_PORT};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Default number of units buffered between the socket task and the consumer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Everything needed to open one camera stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Label used in log lines
    pub name: String,
    pub host: String,
    pub port: u16,
    pub channel: u32,
    pub stream: u32,
    pub credentials: Credentials,
    pub timing: HandshakeTiming,
    /// Optional cap on bytes held while waiting for a start code
    pub max_pending_bytes: Option<usize>,
    pub channel_capacity: usize,
}

impl StreamConfig {
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        let host = host.into();
        Self {
            name: host.clone(),
            host,
            port: DEFAULT_PORT,
            channel: 0,
            stream: 0,
            credentials,
            timing: HandshakeTiming::default(),
            max_pending_bytes: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Printable `host:port`, bracketing IPv6 literals
    fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Item delivered to the consumer
#[derive(Debug)]
pub enum StreamEvent {
    Nal(NalUnit),
    /// Always the last event; never sent after [`BubbleStream::shutdown`]
    Terminal(Terminal),
}

/// Handle to a running camera connection
pub struct BubbleStream {
    events: flume::Receiver<StreamEvent>,
    shutdown_tx: watch::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl BubbleStream {
    /// Spawn the connection task. Must be called from within a tokio runtime.
    pub fn connect(config: StreamConfig) -> Self {
        let (events_tx, events) = flume::bounded(config.channel_capacity.max(1));
        let shutdown_tx = watch::Sender::new(());

        let framer = match config.max_pending_bytes {
            Some(limit) => NalFramer::with_max_pending(limit),
            None => NalFramer::new(),
        };

        let connection = Connection {
            name: config.name.clone(),
            framer,
            lifecycle: Lifecycle::new(),
            events: events_tx,
            shutdown: shutdown_tx.subscribe(),
        };
        let task = tokio::spawn(connection.run(config));

        Self {
            events,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Ordered event sequence for this connection
    pub fn events(&self) -> &flume::Receiver<StreamEvent> {
        &self.events
    }

    /// Close the socket on purpose.
    ///
    /// No terminal event is produced for a teardown; if the connection had
    /// already ended on its own this is a no-op.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Bubble stream task failed: {}", e);
            }
        }
    }

    /// Drive the stream with callbacks until it terminates.
    ///
    /// `on_nal` runs once per unit, in order; `on_terminal` runs exactly once
    /// unless the connection was torn down.
    pub async fn run_with<N, T>(self, mut on_nal: N, on_terminal: T)
    where
        N: FnMut(NalUnit),
        T: FnOnce(Terminal),
    {
        while let Ok(event) = self.events.recv_async().await {
            match event {
                StreamEvent::Nal(unit) => on_nal(unit),
                StreamEvent::Terminal(terminal) => {
                    on_terminal(terminal);
                    break;
                }
            }
        }
    }
}

impl Drop for BubbleStream {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// How the connection loop ended
enum Exit {
    Teardown,
    Terminal(Terminal),
}

struct Connection {
    name: String,
    framer: NalFramer,
    lifecycle: Lifecycle,
    events: flume::Sender<StreamEvent>,
    shutdown: watch::Receiver<()>,
}

impl Connection {
    async fn run(mut self, config: StreamConfig) {
        let delivered = match self.session(&config).await {
            Exit::Terminal(terminal) => self.notify(terminal).await,
            Exit::Teardown => false,
        };
        if !delivered {
            self.lifecycle.teardown();
            log::info!("[{}] Bubble stream closed by caller", self.name);
        }
    }

    /// Deliver the terminal event unless a teardown arrives first.
    ///
    /// Returns `false` if the caller tore the connection down while the
    /// consumer was still backpressuring the channel.
    async fn notify(&mut self, terminal: Terminal) -> bool {
        let Some(terminal) = self.lifecycle.terminate(terminal) else {
            return true;
        };

        match &terminal {
            Terminal::Closed => log::info!("[{}] {}", self.name, terminal),
            Terminal::Error(e) => log::error!("[{}] {}", self.name, e),
        }
        log::debug!(
            "[{}] Dropping {} pending bytes",
            self.name,
            self.framer.pending_len()
        );

        tokio::select! {
            biased;

            _ = self.shutdown.changed() => false,

            _ = self.events.send_async(StreamEvent::Terminal(terminal)) => true,
        }
    }

    async fn session(&mut self, config: &StreamConfig) -> Exit {
        let addr = config.addr();
        log::debug!("[{}] Connecting to {}", self.name, addr);

        let connected = tokio::select! {
            biased;

            _ = self.shutdown.changed() => return Exit::Teardown,

            result = TcpStream::connect((config.host.as_str(), config.port)) => result,
        };

        let mut socket = match connected {
            Ok(socket) => socket,
            Err(source) => {
                return Exit::Terminal(Terminal::Error(BubbleError::Connect { addr, source }))
            }
        };
        if let Err(e) = socket.set_nodelay(true) {
            log::warn!("[{}] Failed to set TCP_NODELAY: {}", self.name, e);
        }

        log::info!(
            "[{}] Connected to {} (ch={}, stream={})",
            self.name,
            addr,
            config.channel,
            config.stream
        );
        log::debug!("[{}] Auth header {}", self.name, hex::encode(AUTH_HEADER));

        let mut handshake = Handshake::new(
            &config.host,
            config.channel,
            config.stream,
            &config.credentials,
            config.timing,
            Instant::now(),
        );

        let (mut reader, mut writer) = socket.split();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => return Exit::Teardown,

                _ = wait_until(handshake.next_deadline()) => {
                    match handshake.write_next(&mut writer).await {
                        Ok(Some(frame)) => log::debug!("[{}] Sent {} frame", self.name, frame),
                        Ok(None) => {}
                        Err(e) => return Exit::Terminal(Terminal::Error(e)),
                    }
                    if handshake.is_complete() {
                        log::info!("[{}] Handshake sent, streaming", self.name);
                    }
                }

                read = reader.read(&mut chunk) => match read {
                    Ok(0) => return Exit::Terminal(Terminal::Closed),
                    Ok(n) => {
                        if let Some(exit) = self.on_data(&chunk[..n]).await {
                            return exit;
                        }
                    }
                    Err(e) => return Exit::Terminal(Terminal::Error(BubbleError::Read(e))),
                },
            }
        }
    }

    /// Frame a received chunk and deliver every completed unit
    async fn on_data(&mut self, chunk: &[u8]) -> Option<Exit> {
        self.framer.extend(chunk);

        while let Some(unit) = self.framer.units().next() {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => return Some(Exit::Teardown),

                sent = self.events.send_async(StreamEvent::Nal(unit)) => {
                    // Receiver gone: nobody is left to notify
                    if sent.is_err() {
                        return Some(Exit::Teardown);
                    }
                }
            }
        }

        self.framer
            .check_pending()
            .err()
            .map(|e| Exit::Terminal(Terminal::Error(e.into())))
    }
}
