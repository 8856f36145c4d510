use async_trait::async_trait;
use thiserror::Error;

use super::types::{DeviceEntry, Point, ScreenSize};

pub mod adb;
pub mod parse;

pub use adb::AdbBridge;

/// Typed failure of a single bridge command
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("`{command}` timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("`{command}` exited with status {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("unparsable output from `{command}`: {detail}")]
    Unparsable {
        command: String,
        detail: String,
        output: String,
    },

    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl BridgeError {
    /// Captured process output, for logs and evidence
    pub fn diagnostic(&self) -> String {
        match self {
            BridgeError::Timeout { command, timeout_ms } => {
                format!("{} produced no result within {}ms", command, timeout_ms)
            }
            BridgeError::NonZeroExit { stdout, stderr, .. } => {
                let mut out = String::new();
                if !stderr.trim().is_empty() {
                    out.push_str("stderr: ");
                    out.push_str(stderr.trim());
                }
                if !stdout.trim().is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str("stdout: ");
                    out.push_str(stdout.trim());
                }
                out
            }
            BridgeError::Unparsable { output, .. } => output.clone(),
            BridgeError::Spawn { source, .. } => source.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

/// Hardware keys the pipeline needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Wakeup,
    Home,
}

impl KeyCode {
    pub fn as_keyevent(&self) -> &'static str {
        match self {
            KeyCode::Wakeup => "KEYCODE_WAKEUP",
            KeyCode::Home => "KEYCODE_HOME",
        }
    }
}

/// Command-execution layer for an attached device
///
/// Every call is blocking from the caller's point of view and carries its own
/// timeout. Implementations must never assume a particular transport beyond
/// what they own; the automation core only sees typed results.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Every device the bridge tool reports, authorized or not
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>, BridgeError>;

    /// Whether the display is currently on
    async fn is_screen_on(&self, serial: &str) -> Result<bool, BridgeError>;

    async fn key_event(&self, serial: &str, key: KeyCode) -> Result<(), BridgeError>;

    /// Ask the messaging app to open a conversation with `number` pre-filled with `body`.
    /// Returns whether the tool reported a successful launch.
    async fn open_compose(&self, serial: &str, number: &str, body: &str) -> Result<bool, BridgeError>;

    /// Raw uiautomator XML for the current screen
    async fn dump_hierarchy(&self, serial: &str) -> Result<String, BridgeError>;

    async fn tap(&self, serial: &str, point: Point) -> Result<(), BridgeError>;

    /// Inject literal text into the focused input; line breaks may arrive as spaces
    async fn type_text(&self, serial: &str, text: &str) -> Result<(), BridgeError>;

    async fn screen_size(&self, serial: &str) -> Result<ScreenSize, BridgeError>;

    /// Package of the focused window, `None` when nothing has focus
    async fn foreground_package(&self, serial: &str) -> Result<Option<String>, BridgeError>;

    /// Free space on shared storage, in KiB
    async fn free_storage_kb(&self, serial: &str) -> Result<u64, BridgeError>;

    /// PNG-encoded screenshot
    async fn screenshot(&self, serial: &str) -> Result<Vec<u8>, BridgeError>;
}
