//! `adb`-backed implementation of [`DeviceBridge`]

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::parse;
use super::{BridgeError, DeviceBridge, KeyCode};
use crate::config::BridgeConfig;
use crate::device::types::{DeviceEntry, Point, ScreenSize};

/// Captured output of a successful command
struct CommandOutput {
    stdout: Vec<u8>,
}

impl CommandOutput {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Drives devices through the `adb` command-line tool
pub struct AdbBridge {
    adb_path: PathBuf,
    timeout: Duration,
    dump_timeout: Duration,
}

impl AdbBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            adb_path: config.adb_path.clone(),
            timeout: config.command_timeout,
            dump_timeout: config.dump_timeout,
        }
    }

    fn describe(&self, serial: Option<&str>, args: &[&str]) -> String {
        let mut parts = vec![self.adb_path.display().to_string()];
        if let Some(serial) = serial {
            parts.push("-s".to_string());
            parts.push(serial.to_string());
        }
        parts.extend(args.iter().map(|a| a.to_string()));
        parts.join(" ")
    }

    /// Run one adb command with a hard timeout; the child is killed if it overruns
    async fn run(
        &self,
        serial: Option<&str>,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, BridgeError> {
        let command = self.describe(serial, args);
        tracing::debug!("adb: {}", command);

        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| BridgeError::Spawn {
            command: command.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| BridgeError::Spawn {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                return Err(BridgeError::Timeout {
                    command,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        if !output.status.success() {
            return Err(BridgeError::NonZeroExit {
                command,
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(CommandOutput {
            stdout: output.stdout,
        })
    }

    async fn shell(&self, serial: &str, args: &[&str]) -> Result<String, BridgeError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        Ok(self.run(Some(serial), &full, self.timeout).await?.text())
    }

    fn unparsable(&self, serial: &str, args: &[&str], detail: &str, output: String) -> BridgeError {
        BridgeError::Unparsable {
            command: self.describe(Some(serial), args),
            detail: detail.to_string(),
            output,
        }
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>, BridgeError> {
        let output = self.run(None, &["devices", "-l"], self.timeout).await?;
        Ok(parse::parse_device_list(&output.text()))
    }

    async fn is_screen_on(&self, serial: &str) -> Result<bool, BridgeError> {
        let args = ["dumpsys", "power"];
        let output = self.shell(serial, &args).await?;
        parse::parse_screen_on(&output).ok_or_else(|| {
            self.unparsable(serial, &args, "no wakefulness or display power state", output)
        })
    }

    async fn key_event(&self, serial: &str, key: KeyCode) -> Result<(), BridgeError> {
        self.shell(serial, &["input", "keyevent", key.as_keyevent()])
            .await
            .map(|_| ())
    }

    async fn open_compose(&self, serial: &str, number: &str, body: &str) -> Result<bool, BridgeError> {
        let args = parse::compose_intent_args(number, body);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.shell(serial, &args).await?;
        Ok(parse::compose_launch_succeeded(&output))
    }

    async fn dump_hierarchy(&self, serial: &str) -> Result<String, BridgeError> {
        let args = ["exec-out", "uiautomator", "dump", "/dev/tty"];
        let output = self.run(Some(serial), &args, self.dump_timeout).await?.text();
        if let Some(xml) = parse::extract_hierarchy_xml(&output) {
            return Ok(xml.to_string());
        }
        Err(self.unparsable(serial, &args, "no hierarchy XML in dump output", output))
    }

    async fn tap(&self, serial: &str, point: Point) -> Result<(), BridgeError> {
        let x = point.x.to_string();
        let y = point.y.to_string();
        self.shell(serial, &["input", "tap", x.as_str(), y.as_str()]).await.map(|_| ())
    }

    async fn type_text(&self, serial: &str, text: &str) -> Result<(), BridgeError> {
        if text.contains(['\n', '\r']) {
            tracing::debug!("Line breaks in typed text are sent as spaces");
        }
        for chunk in parse::input_text_chunks(text) {
            self.shell(serial, &["input", "text", chunk.as_str()]).await?;
        }
        Ok(())
    }

    async fn screen_size(&self, serial: &str) -> Result<ScreenSize, BridgeError> {
        let args = ["wm", "size"];
        let output = self.shell(serial, &args).await?;
        parse::parse_screen_size(&output)
            .ok_or_else(|| self.unparsable(serial, &args, "no size line", output))
    }

    async fn foreground_package(&self, serial: &str) -> Result<Option<String>, BridgeError> {
        let output = self.shell(serial, &["dumpsys", "window", "windows"]).await?;
        Ok(parse::parse_foreground_package(&output))
    }

    async fn free_storage_kb(&self, serial: &str) -> Result<u64, BridgeError> {
        let args = ["df", "/sdcard"];
        let output = self.shell(serial, &args).await?;
        parse::parse_available_kb(&output)
            .ok_or_else(|| self.unparsable(serial, &args, "no df data line", output))
    }

    async fn screenshot(&self, serial: &str) -> Result<Vec<u8>, BridgeError> {
        let args = ["exec-out", "screencap", "-p"];
        let output = self.run(Some(serial), &args, self.dump_timeout).await?;
        if output.stdout.is_empty() {
            return Err(self.unparsable(serial, &args, "empty screencap output", String::new()));
        }
        Ok(output.stdout)
    }
}
