use anyhow::Context;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::automation::{Autopilot, BatchEvent, BatchHandle, BatchSender};
use crate::config::Config;
use crate::device::{AdbBridge, DeviceBridge};
use crate::history::HistoryStore;
use crate::models::{BatchRecipient, SendAttempt};

/// How long a finished batch stays queryable
pub const FINISHED_BATCH_RETENTION: Duration = Duration::from_secs(60 * 60);

/// WebSocket event types broadcast to clients
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// A single send from `/messages/send` finished
    Attempt(SendAttempt),
    Batch(BatchEvent),
}

/// Connected WebSocket client info
#[derive(Debug)]
pub struct ConnectedClient {
    pub connected_at: Instant,
}

/// Shared application state
pub struct AppState {
    pub autopilot: Arc<Autopilot>,

    /// Running batches and recently finished ones: batch_id -> handle
    pub batches: DashMap<String, Arc<BatchHandle>>,

    batch_sender: BatchSender,

    /// Connected WebSocket clients: client_id -> client info
    pub connected_clients: DashMap<String, ConnectedClient>,

    /// Broadcast channel for WebSocket events
    pub ws_broadcast: broadcast::Sender<WsEvent>,
}

impl AppState {
    /// Production wiring: `adb` bridge and on-disk history
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let history = HistoryStore::open(&config.history_db).with_context(|| {
            format!("Failed to open history at {}", config.history_db.display())
        })?;
        tracing::info!("History store initialized at {}", config.history_db.display());

        let bridge: Arc<dyn DeviceBridge> = Arc::new(AdbBridge::new(&config.bridge));
        Ok(Self::with_parts(bridge, history, config))
    }

    pub fn with_parts(bridge: Arc<dyn DeviceBridge>, history: HistoryStore, config: &Config) -> Self {
        let (tx, _) = broadcast::channel(1024);
        let autopilot = Arc::new(Autopilot::new(bridge, history, config));

        Self {
            batch_sender: BatchSender::new(Arc::clone(&autopilot), config.automation.batch_delay),
            autopilot,
            batches: DashMap::new(),
            connected_clients: DashMap::new(),
            ws_broadcast: tx,
        }
    }

    pub fn broadcast(&self, event: WsEvent) {
        // Ignore send errors (no receivers)
        let _ = self.ws_broadcast.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.ws_broadcast.subscribe()
    }

    /// Start a batch and relay its events to WebSocket clients
    pub fn start_batch(
        &self,
        template: String,
        recipients: Vec<BatchRecipient>,
        delay: Option<Duration>,
    ) -> Arc<BatchHandle> {
        let (handle, mut events) = self.batch_sender.start(template, recipients, delay);
        let handle = Arc::new(handle);
        self.batches.insert(handle.id().to_string(), Arc::clone(&handle));

        let ws = self.ws_broadcast.clone();
        let batch_id = handle.id().to_string();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let finished = matches!(&event, BatchEvent::Progress(p) if p.status.is_finished());
                        let _ = ws.send(WsEvent::Batch(event));
                        if finished {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Batch {} relay skipped {} events", batch_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        handle
    }

    pub fn batch(&self, batch_id: &str) -> Option<Arc<BatchHandle>> {
        self.batches.get(batch_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Forget batches that finished at least `retention` ago
    pub async fn prune_finished_batches(&self, retention: Duration) -> usize {
        let handles: Vec<Arc<BatchHandle>> =
            self.batches.iter().map(|entry| Arc::clone(entry.value())).collect();

        let mut removed = 0;
        for handle in handles {
            let Some(finished_at) = handle.progress().await.finished_at else {
                continue;
            };
            let expired = Utc::now()
                .signed_duration_since(finished_at)
                .to_std()
                .map(|age| age >= retention)
                .unwrap_or(false);
            if expired && self.batches.remove(handle.id()).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!("Pruned {} finished batch(es)", removed);
        }
        removed
    }

    /// Register a WebSocket client connection
    pub fn client_connected(&self, client_id: &str) {
        self.connected_clients.insert(
            client_id.to_string(),
            ConnectedClient {
                connected_at: Instant::now(),
            },
        );
        tracing::debug!(
            "Client {} connected (active: {})",
            client_id,
            self.connected_clients.len()
        );
    }

    pub fn client_disconnected(&self, client_id: &str) {
        if let Some((_, client)) = self.connected_clients.remove(client_id) {
            tracing::debug!(
                "Client {} disconnected after {:?} (active: {})",
                client_id,
                client.connected_at.elapsed(),
                self.connected_clients.len()
            );
        }
    }

    /// Get the number of active WebSocket connections
    pub fn active_connection_count(&self) -> usize {
        self.connected_clients.len()
    }
}
