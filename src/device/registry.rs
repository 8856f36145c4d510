use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, OnceLock};

use super::bridge::DeviceBridge;
use super::driver::DriverError;
use super::types::{ConnectionState, Device, ScreenSize};
use crate::error::SendError;

/// Explicit per-session context threaded through every automation call
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub id: String,
    pub device: Device,
    pub started_at: DateTime<Utc>,
    screen_size: Arc<OnceLock<ScreenSize>>,
}

impl DeviceSession {
    pub fn new(device: Device) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device,
            started_at: Utc::now(),
            screen_size: Arc::new(OnceLock::new()),
        }
    }

    pub fn cached_screen_size(&self) -> Option<ScreenSize> {
        self.screen_size.get().copied()
    }

    pub fn remember_screen_size(&self, size: ScreenSize) {
        // First value wins; the screen does not change size mid-session
        let _ = self.screen_size.set(size);
    }
}

/// Result of a successful `connect`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub session_id: String,
    pub device_id: String,
    pub display_name: String,
}

impl From<&DeviceSession> for ConnectionResult {
    fn from(session: &DeviceSession) -> Self {
        Self {
            session_id: session.id.clone(),
            device_id: session.device.id.clone(),
            display_name: session.device.display_name.clone(),
        }
    }
}

/// Discovers authorized devices and opens sessions on them
#[derive(Clone)]
pub struct DeviceRegistry {
    bridge: Arc<dyn DeviceBridge>,
}

impl DeviceRegistry {
    pub fn new(bridge: Arc<dyn DeviceBridge>) -> Self {
        Self { bridge }
    }

    /// Authorized devices, in bridge listing order
    pub async fn list_devices(&self) -> Result<Vec<Device>, SendError> {
        let entries = self.bridge.list_devices().await.map_err(|source| {
            SendError::Driver(DriverError {
                operation: "list_devices",
                device_id: String::new(),
                source,
            })
        })?;

        let skipped = entries.iter().filter(|e| !e.is_authorized()).count();
        if skipped > 0 {
            tracing::debug!("Ignoring {} offline or unauthorized device(s)", skipped);
        }

        Ok(entries
            .into_iter()
            .filter(|e| e.is_authorized())
            .map(|e| Device {
                display_name: e.display_name(),
                id: e.serial,
                connection_state: ConnectionState::Connected,
            })
            .collect())
    }

    /// Select `device_id`, or the first listed device when none is given
    pub async fn connect(&self, device_id: Option<&str>) -> Result<DeviceSession, SendError> {
        let devices = self.list_devices().await?;

        let device = match device_id {
            Some(id) => devices.into_iter().find(|d| d.id == id).ok_or_else(|| {
                SendError::NoDevice(format!("device {} is not connected or not authorized", id))
            })?,
            None => devices
                .into_iter()
                .next()
                .ok_or_else(|| SendError::NoDevice("no authorized device connected".to_string()))?,
        };

        tracing::info!("Connected to {} ({})", device.display_name, device.id);
        Ok(DeviceSession::new(device))
    }
}
