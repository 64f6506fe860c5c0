//! The resilient stream-consumption loop
//!
//! One connection attempt walks Disconnected → Connecting → Streaming and
//! falls back to Disconnected on any transport error, after which the whole
//! dashboard is reset (the daemon replays full state on reconnect) and a
//! cool-down elapses before the next attempt. Decoded updates are queued on
//! the shared dashboard; a dispatch is scheduled only on the queue's
//! empty → non-empty edge, and the consumer waits a short coalescing delay
//! before draining so bursts collapse into a single view refresh.
//!
//! Shutdown is cooperative via a `watch` channel: checked at every await
//! point, it aborts the read promptly and terminates the retry loop without
//! reconnecting.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use taskboard_core::prelude::*;

use crate::codec;
use crate::dashboard::Dashboard;

/// Connection parameters and timing knobs
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub host: String,
    pub port: u16,
    /// Wait after a dispatch is scheduled before draining, so that bursts
    /// coalesce into one refresh
    pub coalesce_delay: Duration,
    /// Cool-down between reconnect attempts
    pub reconnect_delay: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            host: "localhost".to_string(),
            port: 41315,
            coalesce_delay: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

/// Connection phase, for logging and the state machine's own sanity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connecting,
    Streaming,
}

/// Owns the transport connection and drives decode, coalesce, and reconnect.
pub struct StreamReader {
    config: ReaderConfig,
    dashboard: Arc<Dashboard>,
    shutdown: watch::Receiver<bool>,
    phase: Phase,
}

impl StreamReader {
    pub fn new(
        config: ReaderConfig,
        dashboard: Arc<Dashboard>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        StreamReader {
            config,
            dashboard,
            shutdown,
            phase: Phase::Disconnected,
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("connection phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Run until shut down. Transport errors are never fatal: each one
    /// resets the dashboard and schedules a retry.
    pub async fn run(mut self) -> Result<()> {
        // Capacity 1 on purpose: the edge-triggered schedule signal never
        // needs to queue more than one dispatch.
        let (dispatch_tx, dispatch_rx) = mpsc::channel::<()>(1);
        let consumer = tokio::spawn(dispatch_loop(
            Arc::clone(&self.dashboard),
            dispatch_rx,
            self.config.coalesce_delay,
        ));

        while !self.shutdown_requested() {
            match self.connect_and_stream(&dispatch_tx).await {
                Ok(()) => break, // clean shutdown mid-stream
                Err(e) => {
                    self.set_phase(Phase::Disconnected);
                    if self.shutdown_requested() {
                        break;
                    }
                    warn!(
                        "connection to {}:{} lost: {e}; retrying in {:?}",
                        self.config.host, self.config.port, self.config.reconnect_delay
                    );
                    // No stale state may outlive the connection.
                    self.dashboard.clear_all();

                    tokio::select! {
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
            }
        }

        info!("stream reader shutting down");
        drop(dispatch_tx);
        let _ = consumer.await;
        Ok(())
    }

    /// One connection attempt. `Ok(())` means shutdown was requested; any
    /// transport problem surfaces as `Err`.
    async fn connect_and_stream(&mut self, dispatch_tx: &mpsc::Sender<()>) -> Result<()> {
        self.set_phase(Phase::Connecting);
        debug!("connecting to {}:{}", self.config.host, self.config.port);

        let stream = tokio::select! {
            result = TcpStream::connect((self.config.host.as_str(), self.config.port)) => result?,
            _ = self.shutdown.changed() => return Ok(()),
        };
        let mut reader = BufReader::new(stream);

        self.set_phase(Phase::Streaming);

        // Protocol handshake: the first record is a header. It is consumed
        // and remembered for display only.
        let header = tokio::select! {
            result = codec::read_header(&mut reader) => result?,
            _ = self.shutdown.changed() => return Ok(()),
        };
        info!("streaming updates for project {}", header.project_root);
        self.dashboard.set_project_root(header.project_root);

        loop {
            let update = tokio::select! {
                result = codec::read_update(&mut reader) => result?,
                _ = self.shutdown.changed() => return Ok(()),
            };
            trace!("update for task {}", update.id);

            if self.dashboard.enqueue(update) {
                // Edge: the queue just became non-empty. try_send because a
                // full channel already has a dispatch in flight.
                let _ = dispatch_tx.try_send(());
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Consumer half: for each scheduled dispatch, wait out the coalescing
/// delay, then drain the queue and notify the view. Ends when the producer
/// side is dropped.
async fn dispatch_loop(dashboard: Arc<Dashboard>, mut rx: mpsc::Receiver<()>, delay: Duration) {
    while rx.recv().await.is_some() {
        tokio::time::sleep(delay).await;
        dashboard.apply_pending();
    }
    debug!("dispatch loop finished");
}
