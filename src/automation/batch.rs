//! Sequential sends to many recipients
//!
//! Pause, resume and cancel are observed only between attempts. An attempt
//! that has started composing always runs to its terminal state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};

use super::service::Autopilot;
use crate::models::{BatchRecipient, SendAttempt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchControl {
    Run,
    Pause,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Running,
    Paused,
    Completed,
    Cancelled,
    /// Stopped early by an error that would fail every remaining message
    Aborted,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Running => "running",
            BatchStatus::Paused => "paused",
            BatchStatus::Completed => "completed",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Aborted => "aborted",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Cancelled | BatchStatus::Aborted)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total: usize,
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Rejected by validation before reaching the device
    pub rejected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Attempt {
        batch_id: String,
        index: usize,
        attempt: SendAttempt,
    },
    Rejected {
        batch_id: String,
        index: usize,
        recipient: String,
        error: String,
    },
    Progress(BatchProgress),
}

/// Control surface of a running batch
pub struct BatchHandle {
    id: String,
    control: watch::Sender<BatchControl>,
    progress: Arc<Mutex<BatchProgress>>,
    events: broadcast::Sender<BatchEvent>,
}

impl BatchHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pause(&self) {
        self.signal(BatchControl::Pause);
    }

    pub fn resume(&self) {
        self.signal(BatchControl::Run);
    }

    pub fn cancel(&self) {
        self.signal(BatchControl::Cancel);
    }

    /// Cancellation is final
    fn signal(&self, next: BatchControl) {
        let changed = self.control.send_if_modified(|current| {
            if *current == BatchControl::Cancel || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::info!("Batch {} signalled {:?}", self.id, next);
        }
    }

    pub async fn progress(&self) -> BatchProgress {
        self.progress.lock().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }
}

/// Starts batches against an [`Autopilot`]
#[derive(Clone)]
pub struct BatchSender {
    autopilot: Arc<Autopilot>,
    delay: Duration,
}

impl BatchSender {
    pub fn new(autopilot: Arc<Autopilot>, delay: Duration) -> Self {
        Self { autopilot, delay }
    }

    /// Spawn the batch; the receiver sees every event from the first one on
    pub fn start(
        &self,
        template: String,
        recipients: Vec<BatchRecipient>,
        delay: Option<Duration>,
    ) -> (BatchHandle, broadcast::Receiver<BatchEvent>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (control_tx, control_rx) = watch::channel(BatchControl::Run);
        let (events_tx, events_rx) = broadcast::channel(256);
        let progress = Arc::new(Mutex::new(BatchProgress {
            batch_id: id.clone(),
            status: BatchStatus::Running,
            total: recipients.len(),
            processed: 0,
            sent: 0,
            failed: 0,
            rejected: 0,
            current: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }));

        let run = BatchRun {
            id: id.clone(),
            autopilot: Arc::clone(&self.autopilot),
            progress: Arc::clone(&progress),
            events: events_tx.clone(),
            control: control_rx,
            delay: delay.unwrap_or(self.delay),
        };
        tokio::spawn(run.execute(template, recipients));

        let handle = BatchHandle {
            id,
            control: control_tx,
            progress,
            events: events_tx,
        };
        (handle, events_rx)
    }
}

struct BatchRun {
    id: String,
    autopilot: Arc<Autopilot>,
    progress: Arc<Mutex<BatchProgress>>,
    events: broadcast::Sender<BatchEvent>,
    control: watch::Receiver<BatchControl>,
    delay: Duration,
}

impl BatchRun {
    async fn execute(mut self, template: String, recipients: Vec<BatchRecipient>) {
        tracing::info!("Starting batch {} with {} recipients", self.id, recipients.len());

        for (index, item) in recipients.into_iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = self.control.changed() => {}
                }
            }

            if !self.gate().await {
                self.finish(BatchStatus::Cancelled, None).await;
                return;
            }

            self.update(|p| p.current = Some(item.recipient.clone())).await;

            let result = self
                .autopilot
                .send_message(&item.recipient, &template, &item.fields, item.contact_ref.clone())
                .await;

            match result {
                Ok(attempt) => {
                    let sent = attempt.is_sent();
                    self.emit(BatchEvent::Attempt {
                        batch_id: self.id.clone(),
                        index,
                        attempt,
                    });
                    self.update(|p| {
                        p.processed += 1;
                        if sent {
                            p.sent += 1;
                        } else {
                            p.failed += 1;
                        }
                    })
                    .await;
                }
                Err(e) if e.is_validation() => {
                    tracing::warn!("Batch {} skipping {}: {}", self.id, item.recipient, e);
                    self.emit(BatchEvent::Rejected {
                        batch_id: self.id.clone(),
                        index,
                        recipient: item.recipient.clone(),
                        error: e.to_string(),
                    });
                    self.update(|p| {
                        p.processed += 1;
                        p.rejected += 1;
                    })
                    .await;
                }
                Err(e) => {
                    tracing::error!("Batch {} aborted: {}", self.id, e);
                    self.finish(BatchStatus::Aborted, Some(e.to_string())).await;
                    return;
                }
            }
        }

        self.finish(BatchStatus::Completed, None).await;
    }

    /// Wait out a pause; false once cancelled
    async fn gate(&mut self) -> bool {
        loop {
            let control = *self.control.borrow_and_update();
            match control {
                BatchControl::Run => {
                    self.update(|p| p.status = BatchStatus::Running).await;
                    return true;
                }
                BatchControl::Cancel => return false,
                BatchControl::Pause => {
                    tracing::info!("Batch {} paused", self.id);
                    self.update(|p| {
                        p.status = BatchStatus::Paused;
                        p.current = None;
                    })
                    .await;
                    if self.control.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    async fn update(&self, apply: impl FnOnce(&mut BatchProgress)) {
        let snapshot = {
            let mut progress = self.progress.lock().await;
            apply(&mut progress);
            progress.clone()
        };
        self.emit(BatchEvent::Progress(snapshot));
    }

    async fn finish(&self, status: BatchStatus, error: Option<String>) {
        self.update(|p| {
            p.status = status;
            p.current = None;
            p.error = error;
            p.finished_at = Some(Utc::now());
        })
        .await;

        let progress = self.progress.lock().await;
        tracing::info!(
            "Batch {} {}: {} sent, {} failed, {} rejected of {}",
            self.id,
            status.as_str(),
            progress.sent,
            progress.failed,
            progress.rejected,
            progress.total
        );
    }

    fn emit(&self, event: BatchEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
