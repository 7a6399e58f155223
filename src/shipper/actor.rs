//! Shipper Actor - single owner of buffer, segment and ledger
//!
//! ## Architecture
//!
//! ```text
//! Producer 1 ──┐
//! Producer 2 ──┤──► ShipperActor ──► ShipperCore ──► append_with_retry ──► store
//! Producer 3 ──┘         ▲
//!                        └── interval tick (time-based flush)
//! ```
//!
//! Producers never block and never see backend errors: `ship` is a send on an
//! unbounded channel. Backend calls run only inside the actor task.

use super::clock::ShipperClock;
use super::config::ShipperConfig;
use super::core::{ShipperCore, ShipperStats};
use super::error::{ShipperError, ShipperResult};
use super::object_store::AppendObjectStore;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Messages for the shipper actor
pub enum ShipperMessage {
    /// A rendered log line
    Line(String),
    /// Flush everything buffered and report lines shipped
    Flush {
        ack_tx: oneshot::Sender<ShipperResult<usize>>,
    },
    /// Evaluate the time-based flush trigger now
    Tick,
    /// Snapshot of counters
    Stats {
        reply_tx: oneshot::Sender<ShipperStats>,
    },
    /// Final flush, then stop
    Shutdown {
        response_tx: oneshot::Sender<ShipperResult<usize>>,
    },
}

/// Actor that owns the core and processes messages in arrival order
pub struct ShipperActor<S: AppendObjectStore, C: ShipperClock> {
    core: ShipperCore<S, C>,
    rx: mpsc::UnboundedReceiver<ShipperMessage>,
    tick_interval: Duration,
}

impl<S: AppendObjectStore, C: ShipperClock> ShipperActor<S, C> {
    fn new(
        core: ShipperCore<S, C>,
        rx: mpsc::UnboundedReceiver<ShipperMessage>,
        tick_interval: Duration,
    ) -> Self {
        ShipperActor {
            core,
            rx,
            tick_interval,
        }
    }

    /// Run the actor loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => {
                        if self.handle_message(msg).await {
                            break;
                        }
                    }
                    None => {
                        info!("All shipper handles dropped, flushing remaining lines");
                        let _ = self.core.on_shutdown().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let _ = self.core.on_tick().await;
                }
            }
        }
    }

    /// Handle a single message. Returns true on shutdown.
    async fn handle_message(&mut self, msg: ShipperMessage) -> bool {
        match msg {
            ShipperMessage::Line(line) => {
                // Failures are logged by the core; lines stay buffered
                let _ = self.core.on_event(line).await;
                false
            }
            ShipperMessage::Flush { ack_tx } => {
                let _ = ack_tx.send(self.core.flush().await);
                false
            }
            ShipperMessage::Tick => {
                let _ = self.core.on_tick().await;
                false
            }
            ShipperMessage::Stats { reply_tx } => {
                let _ = reply_tx.send(self.core.stats());
                false
            }
            ShipperMessage::Shutdown { response_tx } => {
                let result = self.core.on_shutdown().await;
                let stats = self.core.stats();
                info!(
                    shipped = stats.lines_shipped,
                    pending = stats.pending_lines,
                    dropped = stats.lines_dropped,
                    "Shipper actor shutting down"
                );
                let _ = response_tx.send(result);
                true
            }
        }
    }
}

// ============================================================================
// ShipperHandle - public interface for producers
// ============================================================================

/// Cloneable handle for sending lines to the shipper actor
#[derive(Clone)]
pub struct ShipperHandle {
    tx: mpsc::UnboundedSender<ShipperMessage>,
}

impl ShipperHandle {
    /// Queue a line for shipment. Never blocks; a stopped shipper drops it.
    pub fn ship(&self, line: impl Into<String>) {
        if self.tx.send(ShipperMessage::Line(line.into())).is_err() {
            debug!("Shipper stopped, line discarded");
        }
    }

    /// Evaluate the time-based flush trigger without waiting for the timer
    pub fn tick(&self) {
        let _ = self.tx.send(ShipperMessage::Tick);
    }

    /// Flush everything queued so far; returns lines shipped
    pub async fn flush(&self) -> ShipperResult<usize> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(ShipperMessage::Flush { ack_tx })
            .map_err(|_| ShipperError::Closed)?;
        ack_rx.await.unwrap_or(Err(ShipperError::Closed))
    }

    /// Snapshot of the shipper's counters
    pub async fn stats(&self) -> ShipperResult<ShipperStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ShipperMessage::Stats { reply_tx })
            .map_err(|_| ShipperError::Closed)?;
        reply_rx.await.map_err(|_| ShipperError::Closed)
    }

    /// Graceful shutdown: waits for the final flush
    pub async fn shutdown(&self) -> ShipperResult<usize> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ShipperMessage::Shutdown { response_tx })
            .map_err(|_| ShipperError::Closed)?;
        response_rx.await.unwrap_or(Err(ShipperError::Closed))
    }

    /// True once the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Open the core and spawn the actor; returns its handle + join handle
pub async fn spawn_shipper<S, C>(
    config: &ShipperConfig,
    store: S,
    clock: C,
) -> ShipperResult<(ShipperHandle, tokio::task::JoinHandle<()>)>
where
    S: AppendObjectStore,
    C: ShipperClock,
{
    let core = ShipperCore::open(config, store, clock).await?;
    let (tx, rx) = mpsc::unbounded_channel();

    let actor = ShipperActor::new(core, rx, config.flush.tick_interval);
    let task = tokio::spawn(actor.run());

    Ok((ShipperHandle { tx }, task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shipper::clock::SimulatedClock;
    use crate::shipper::object_store::InMemoryAppendStore;

    fn config() -> ShipperConfig {
        let mut config = ShipperConfig::test();
        config.flush.max_lines = 100;
        config.flush.interval = Duration::from_secs(20);
        config.max_segment_size = 1 << 20;
        config
    }

    #[tokio::test]
    async fn test_ship_and_flush() {
        let store = InMemoryAppendStore::new();
        let (handle, task) = spawn_shipper(&config(), store.clone(), SimulatedClock::new(0))
            .await
            .unwrap();

        for i in 0..10 {
            handle.ship(format!("line {}", i));
        }
        assert_eq!(handle.flush().await.unwrap(), 10);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.lines_shipped, 10);
        let expected: String = (0..10).map(|i| format!("line {}\n", i)).collect();
        assert_eq!(store.object(&stats.active_key).unwrap(), expected.as_bytes());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_closes() {
        let store = InMemoryAppendStore::new();
        let (handle, task) = spawn_shipper(&config(), store.clone(), SimulatedClock::new(0))
            .await
            .unwrap();

        handle.ship("last words");
        assert_eq!(handle.shutdown().await.unwrap(), 1);
        task.await.unwrap();

        assert!(handle.is_closed());
        handle.ship("ignored");
        assert!(matches!(handle.flush().await, Err(ShipperError::Closed)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_tick_drives_interval_flush() {
        let store = InMemoryAppendStore::new();
        let clock = SimulatedClock::new(0);
        let (handle, task) = spawn_shipper(&config(), store.clone(), clock.clone())
            .await
            .unwrap();

        handle.ship("idle line");
        handle.tick();
        assert_eq!(handle.stats().await.unwrap().pending_lines, 1);

        clock.advance(Duration::from_secs(20));
        handle.tick();
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.pending_lines, 0);
        assert_eq!(stats.lines_shipped, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handles_flushes() {
        let store = InMemoryAppendStore::new();
        let (handle, task) = spawn_shipper(&config(), store.clone(), SimulatedClock::new(0))
            .await
            .unwrap();

        let producer = handle.clone();
        producer.ship("from clone");
        drop(producer);
        drop(handle);
        task.await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_producers_preserve_per_producer_order() {
        let store = InMemoryAppendStore::new();
        let (handle, task) = spawn_shipper(&config(), store.clone(), SimulatedClock::new(0))
            .await
            .unwrap();

        let mut producers = Vec::new();
        for p in 0..4 {
            let h = handle.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..50 {
                    h.ship(format!("p{} {}", p, i));
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        handle.flush().await.unwrap();

        let key = handle.stats().await.unwrap().active_key;
        let content = String::from_utf8(store.object(&key).unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 200);
        for p in 0..4 {
            let seq: Vec<u32> = lines
                .iter()
                .filter_map(|l| l.strip_prefix(&format!("p{} ", p)))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..50).collect::<Vec<_>>());
        }

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
