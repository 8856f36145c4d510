use std::sync::Arc;
use tokio::sync::RwLock;

use super::controller::RetryController;
use super::evidence::EvidenceStore;
use crate::compose::{self, format_phone_number};
use crate::config::Config;
use crate::device::{
    ConnectionResult, Device, DeviceBridge, DeviceRegistry, DeviceSession, Screenshot, UiDriver,
};
use crate::error::SendError;
use crate::history::{HistoryRecord, HistoryStore};
use crate::models::{ContactFields, OutboundMessage, SendAttempt};

/// Entry point for callers: connect, send and read history
///
/// Holds the active [`DeviceSession`]; there is no process-wide device state.
pub struct Autopilot {
    registry: DeviceRegistry,
    driver: UiDriver,
    controller: RetryController,
    history: HistoryStore,
    session: RwLock<Option<DeviceSession>>,
}

impl Autopilot {
    pub fn new(bridge: Arc<dyn DeviceBridge>, history: HistoryStore, config: &Config) -> Self {
        let driver = UiDriver::new(Arc::clone(&bridge));
        let controller = RetryController::new(
            driver.clone(),
            history.clone(),
            EvidenceStore::new(config.evidence_dir.clone()),
            config.automation.clone(),
        );

        Self {
            registry: DeviceRegistry::new(bridge),
            driver,
            controller,
            history,
            session: RwLock::new(None),
        }
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, SendError> {
        self.registry.list_devices().await
    }

    /// Select a device and make it the active session
    pub async fn connect(&self, device_id: Option<&str>) -> Result<ConnectionResult, SendError> {
        let session = self.registry.connect(device_id).await?;
        let result = ConnectionResult::from(&session);
        *self.session.write().await = Some(session);
        Ok(result)
    }

    pub async fn session(&self) -> Option<DeviceSession> {
        self.session.read().await.clone()
    }

    /// Whether an attempt is running on the active device, if there is one
    pub async fn device_busy(&self) -> Option<bool> {
        self.session().await.map(|s| self.driver.is_busy(&s.device))
    }

    /// The active session, connecting to the first device if there is none
    async fn active_session(&self) -> Result<DeviceSession, SendError> {
        if let Some(session) = self.session().await {
            return Ok(session);
        }

        tracing::info!("No active session, connecting to the first available device");
        self.connect(None).await?;
        self.session()
            .await
            .ok_or_else(|| SendError::NoDevice("session was not established".to_string()))
    }

    /// Render and validate without touching the device
    pub fn preview(
        &self,
        recipient: &str,
        template: &str,
        fields: &ContactFields,
    ) -> Result<OutboundMessage, SendError> {
        compose::compose(recipient, template, fields, None)
    }

    /// Validate, then run one attempt on the active device
    pub async fn send_message(
        &self,
        recipient: &str,
        template: &str,
        fields: &ContactFields,
        contact_ref: Option<String>,
    ) -> Result<SendAttempt, SendError> {
        let message = compose::compose(recipient, template, fields, contact_ref)?;
        self.send_composed(message).await
    }

    pub async fn send_composed(&self, message: OutboundMessage) -> Result<SendAttempt, SendError> {
        let session = self.active_session().await?;
        Ok(self.controller.run(&session, message).await)
    }

    /// Most recent records first
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>, SendError> {
        Ok(self.history.recent(limit)?)
    }

    /// Records for one recipient, in any formatting
    pub fn history_for_phone(&self, phone: &str, limit: usize) -> Result<Vec<HistoryRecord>, SendError> {
        let number = format_phone_number(phone).ok_or_else(|| SendError::InvalidPhone {
            raw: phone.to_string(),
        })?;
        Ok(self.history.for_phone(&number, limit)?)
    }

    pub fn history_count(&self) -> Result<i64, SendError> {
        Ok(self.history.count()?)
    }

    /// Capture the active device's screen; waits for any attempt in progress
    pub async fn screenshot(&self) -> Result<(Device, Screenshot), SendError> {
        let session = self.active_session().await?;
        let handle = self.driver.acquire(&session.device).await;
        let shot = handle.screenshot().await?;
        Ok((session.device, shot))
    }

    pub fn config_summary(&self) -> String {
        let config = self.controller.config();
        format!(
            "mode={} verify_attempts={} max_retries={} heuristic_points={}",
            config.verification_mode.as_str(),
            config.verify_attempts,
            config.max_retries,
            config.heuristic_points.len()
        )
    }
}
