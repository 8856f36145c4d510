use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::bridge::{BridgeError, DeviceBridge, KeyCode};
use super::hierarchy::HierarchySnapshot;
use super::screenshot::Screenshot;
use super::types::{Device, Point, ScreenSize};

/// A device command failed or timed out
#[derive(Error, Debug)]
#[error("{operation} failed on {device_id}: {source}")]
pub struct DriverError {
    pub operation: &'static str,
    pub device_id: String,
    #[source]
    pub source: BridgeError,
}

impl DriverError {
    pub fn diagnostic(&self) -> String {
        self.source.diagnostic()
    }

    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

/// Issues UI automation commands through a [`DeviceBridge`]
///
/// The device's screen is shared mutable state, so every command goes through
/// a [`DeviceHandle`] that owns that device's lock for as long as it lives.
#[derive(Clone)]
pub struct UiDriver {
    bridge: Arc<dyn DeviceBridge>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl UiDriver {
    pub fn new(bridge: Arc<dyn DeviceBridge>) -> Self {
        Self {
            bridge,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Wait for exclusive use of `device`
    pub async fn acquire(&self, device: &Device) -> DeviceHandle {
        let lock = self
            .locks
            .entry(device.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock.lock_owned().await;
        tracing::debug!("Acquired device lock for {}", device.id);

        DeviceHandle {
            bridge: Arc::clone(&self.bridge),
            device: device.clone(),
            _guard: guard,
        }
    }

    /// Whether another task currently holds `device`
    pub fn is_busy(&self, device: &Device) -> bool {
        self.locks
            .get(&device.id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}

/// Exclusive access to one device; dropping it releases the device
pub struct DeviceHandle {
    bridge: Arc<dyn DeviceBridge>,
    device: Device,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceHandle {
    fn fail(&self, operation: &'static str, source: BridgeError) -> DriverError {
        tracing::warn!("{} on {} failed: {}", operation, self.device.id, source);
        DriverError {
            operation,
            device_id: self.device.id.clone(),
            source,
        }
    }

    /// Turn the screen on if it is off. Returns whether a wake key was sent.
    pub async fn wake(&self) -> Result<bool, DriverError> {
        let on = self
            .bridge
            .is_screen_on(&self.device.id)
            .await
            .map_err(|e| self.fail("wake", e))?;
        if on {
            return Ok(false);
        }

        self.bridge
            .key_event(&self.device.id, KeyCode::Wakeup)
            .await
            .map_err(|e| self.fail("wake", e))?;
        tracing::info!("Woke screen on {}", self.device.id);
        Ok(true)
    }

    pub async fn press_home(&self) -> Result<(), DriverError> {
        self.bridge
            .key_event(&self.device.id, KeyCode::Home)
            .await
            .map_err(|e| self.fail("press_home", e))
    }

    pub async fn open_compose(&self, number: &str, body: &str) -> Result<bool, DriverError> {
        self.bridge
            .open_compose(&self.device.id, number, body)
            .await
            .map_err(|e| self.fail("open_compose", e))
    }

    /// Capture and parse the current UI tree
    pub async fn dump_hierarchy(&self) -> Result<Arc<HierarchySnapshot>, DriverError> {
        let raw = self
            .bridge
            .dump_hierarchy(&self.device.id)
            .await
            .map_err(|e| self.fail("dump_hierarchy", e))?;

        match HierarchySnapshot::parse(raw) {
            Ok(snapshot) => {
                tracing::debug!("Dumped {} nodes from {}", snapshot.len(), self.device.id);
                Ok(Arc::new(snapshot))
            }
            Err(e) => Err(self.fail(
                "dump_hierarchy",
                BridgeError::Unparsable {
                    command: "uiautomator dump".to_string(),
                    detail: e.to_string(),
                    output: String::new(),
                },
            )),
        }
    }

    pub async fn tap(&self, point: Point) -> Result<(), DriverError> {
        tracing::debug!("Tap {} on {}", point, self.device.id);
        self.bridge
            .tap(&self.device.id, point)
            .await
            .map_err(|e| self.fail("tap", e))
    }

    pub async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.bridge
            .type_text(&self.device.id, text)
            .await
            .map_err(|e| self.fail("type_text", e))
    }

    pub async fn screen_size(&self) -> Result<ScreenSize, DriverError> {
        self.bridge
            .screen_size(&self.device.id)
            .await
            .map_err(|e| self.fail("screen_size", e))
    }

    pub async fn foreground_package(&self) -> Result<Option<String>, DriverError> {
        self.bridge
            .foreground_package(&self.device.id)
            .await
            .map_err(|e| self.fail("foreground_package", e))
    }

    pub async fn free_storage_kb(&self) -> Result<u64, DriverError> {
        self.bridge
            .free_storage_kb(&self.device.id)
            .await
            .map_err(|e| self.fail("free_storage_kb", e))
    }

    pub async fn screenshot(&self) -> Result<Screenshot, DriverError> {
        let png = self
            .bridge
            .screenshot(&self.device.id)
            .await
            .map_err(|e| self.fail("screenshot", e))?;

        Screenshot::from_png(png).map_err(|e| {
            self.fail(
                "screenshot",
                BridgeError::Unparsable {
                    command: "screencap -p".to_string(),
                    detail: e.to_string(),
                    output: String::new(),
                },
            )
        })
    }
}
