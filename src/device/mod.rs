//! Device automation module
//!
//! Drives an attached Android device through its debugging bridge.
//!
//! ## Architecture
//!
//! - `DeviceBridge` - transport abstraction; `AdbBridge` shells out to `adb`
//! - `DeviceRegistry` - lists authorized devices and opens a `DeviceSession`
//! - `UiDriver` / `DeviceHandle` - serialized per-device commands with typed errors
//! - `HierarchySnapshot` - immutable parse of a uiautomator dump
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_autopilot::device::{AdbBridge, DeviceRegistry, UiDriver};
//!
//! let bridge = Arc::new(AdbBridge::new(&config.bridge));
//! let session = DeviceRegistry::new(bridge.clone()).connect(None).await?;
//!
//! let driver = UiDriver::new(bridge);
//! let handle = driver.acquire(&session.device).await;
//! let snapshot = handle.dump_hierarchy().await?;
//! println!("{}", serializer::format_snapshot(&snapshot));
//! ```

pub mod bridge;
pub mod driver;
pub mod hierarchy;
pub mod registry;
pub mod screenshot;
pub mod serializer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use bridge::{AdbBridge, BridgeError, DeviceBridge, KeyCode};
pub use driver::{DeviceHandle, DriverError, UiDriver};
pub use hierarchy::{HierarchyError, HierarchySnapshot};
pub use registry::{ConnectionResult, DeviceRegistry, DeviceSession};
pub use screenshot::Screenshot;
pub use types::{Bounds, ConnectionState, Device, DeviceEntry, Point, ScreenSize, UiElement};
