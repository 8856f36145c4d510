use std::path::{Path, PathBuf};

use crate::device::{serializer, DeviceHandle, HierarchySnapshot};

/// Writes diagnosis artifacts for failed attempts
///
/// Layout: `<root>/<attempt_id>/{hierarchy.xml,elements.txt,screenshot.png}`.
/// Write failures are logged and skipped; they never change an attempt's outcome.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Save the last snapshot (or a fresh one) and a screenshot; returns the paths written
    pub async fn capture(
        &self,
        attempt_id: &str,
        handle: &DeviceHandle,
        snapshot: Option<&HierarchySnapshot>,
    ) -> Vec<String> {
        let dir = self.root.join(attempt_id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::error!("Failed to create evidence directory {:?}: {}", dir, e);
            return Vec::new();
        }

        let mut written = Vec::new();

        let fresh;
        let snapshot = match snapshot {
            Some(s) => Some(s),
            None => {
                fresh = handle.dump_hierarchy().await.ok();
                fresh.as_deref()
            }
        };

        if let Some(snapshot) = snapshot {
            write(&dir.join("hierarchy.xml"), snapshot.raw().as_bytes(), &mut written).await;
            write(
                &dir.join("elements.txt"),
                serializer::format_snapshot(snapshot).as_bytes(),
                &mut written,
            )
            .await;
        }

        match handle.screenshot().await {
            Ok(shot) => write(&dir.join("screenshot.png"), shot.png(), &mut written).await,
            Err(e) => tracing::warn!("No screenshot for attempt {}: {}", attempt_id, e),
        }

        tracing::info!("Kept {} evidence file(s) for attempt {} in {:?}", written.len(), attempt_id, dir);
        written
    }
}

async fn write(path: &Path, contents: &[u8], written: &mut Vec<String>) {
    match tokio::fs::write(path, contents).await {
        Ok(()) => written.push(path.display().to_string()),
        Err(e) => tracing::error!("Failed to write evidence {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{compose_screen, FakeBridge, NodeSpec};
    use crate::device::{ConnectionState, Device, UiDriver};
    use std::sync::Arc;

    fn device() -> Device {
        Device {
            id: "emu".to_string(),
            display_name: "emu".to_string(),
            connection_state: ConnectionState::Connected,
        }
    }

    #[tokio::test]
    async fn test_capture_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        let driver = UiDriver::new(Arc::new(FakeBridge::new()));
        let handle = driver.acquire(&device()).await;

        let snapshot =
            HierarchySnapshot::parse(compose_screen(&[NodeSpec::text_view("Message failed")])).unwrap();
        let files = store.capture("attempt-1", &handle, Some(&snapshot)).await;

        assert_eq!(files.len(), 3);
        let xml = std::fs::read_to_string(dir.path().join("attempt-1/hierarchy.xml")).unwrap();
        assert_eq!(xml, snapshot.raw());
        let listing = std::fs::read_to_string(dir.path().join("attempt-1/elements.txt")).unwrap();
        assert!(listing.contains("Message failed"));
        assert!(dir.path().join("attempt-1/screenshot.png").exists());
    }

    #[tokio::test]
    async fn test_capture_dumps_when_no_snapshot_was_kept() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(FakeBridge::new());
        let driver = UiDriver::new(bridge.clone());
        let handle = driver.acquire(&device()).await;

        let files = EvidenceStore::new(dir.path()).capture("attempt-2", &handle, None).await;
        assert_eq!(bridge.count("dump"), 1);
        assert_eq!(files.len(), 3);
    }
}
