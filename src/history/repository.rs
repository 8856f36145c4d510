use anyhow::{anyhow, Result};
use chrono::SecondsFormat;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::models::HistoryRecord;

/// Append-only SQLite log of send attempts
#[derive(Clone)]
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        tracing::info!("History store opened at {:?}", path);
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS send_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                attempt_id TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                contact_data_snapshot TEXT NOT NULL DEFAULT '{}',
                device_id TEXT NOT NULL,
                contact_ref TEXT,
                strategy TEXT,
                error TEXT,
                evidence TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_send_history_timestamp ON send_history(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_send_history_phone ON send_history(phone_number);
            "#,
        )?;

        Ok(())
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO send_history (id, attempt_id, phone_number, message, status, timestamp,
                                      contact_data_snapshot, device_id, contact_ref, strategy,
                                      error, evidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                record.id,
                record.attempt_id,
                record.phone_number,
                record.message,
                record.status.as_str(),
                record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                serde_json::to_string(&record.contact_data_snapshot)?,
                record.device_id,
                record.contact_ref,
                record.strategy,
                record.error,
                serde_json::to_string(&record.evidence)?,
            ],
        )?;

        tracing::debug!("Recorded {} for {}", record.status.as_str(), record.phone_number);
        Ok(())
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM send_history ORDER BY timestamp DESC, seq DESC LIMIT ?1",
            COLUMNS
        ))?;

        let records = stmt
            .query_map(params![limit as i64], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Most recent records for one normalized number
    pub fn for_phone(&self, phone_number: &str, limit: usize) -> Result<Vec<HistoryRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM send_history WHERE phone_number = ?1 \
             ORDER BY timestamp DESC, seq DESC LIMIT ?2",
            COLUMNS
        ))?;

        let records = stmt
            .query_map(params![phone_number, limit as i64], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let total = conn.query_row("SELECT COUNT(*) FROM send_history", [], |row| row.get(0))?;
        Ok(total)
    }

    /// Make every later write fail
    #[cfg(test)]
    pub(crate) fn drop_schema(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("DROP TABLE send_history").unwrap();
    }
}

const COLUMNS: &str = "id, attempt_id, phone_number, message, status, timestamp, \
                       contact_data_snapshot, device_id, contact_ref, strategy, error, evidence";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let status: String = row.get(4)?;
    let timestamp: String = row.get(5)?;
    let snapshot: String = row.get(6)?;
    let evidence: String = row.get(11)?;

    Ok(HistoryRecord {
        id: row.get(0)?,
        attempt_id: row.get(1)?,
        phone_number: row.get(2)?,
        message: row.get(3)?,
        status: status.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown status {:?}", status).into(),
            )
        })?,
        timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?,
        contact_data_snapshot: serde_json::from_str(&snapshot).unwrap_or_default(),
        device_id: row.get(7)?,
        contact_ref: row.get(8)?,
        strategy: row.get(9)?,
        error: row.get(10)?,
        evidence: serde_json::from_str(&evidence).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SendStatus;
    use chrono::{Duration, TimeZone, Utc};

    fn record(phone: &str, status: SendStatus, seconds: i64) -> HistoryRecord {
        HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            attempt_id: uuid::Uuid::new_v4().to_string(),
            phone_number: phone.to_string(),
            message: format!("hello {}", seconds),
            status,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds),
            contact_data_snapshot: serde_json::json!({"firstName": "Jane"}),
            device_id: "emulator-5554".to_string(),
            contact_ref: None,
            strategy: Some("exact_text".to_string()),
            error: None,
            evidence: vec![],
        }
    }

    #[test]
    fn test_append_and_recent_newest_first() {
        let store = HistoryStore::in_memory().unwrap();
        store.append(&record("5551234567", SendStatus::SentAutomatically, 1)).unwrap();
        store.append(&record("5551234567", SendStatus::AutoClickFailed, 3)).unwrap();
        store.append(&record("5559876543", SendStatus::Failed, 2)).unwrap();

        let recent = store.recent(10).unwrap();
        let messages: Vec<&str> = recent.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["hello 3", "hello 2", "hello 1"]);
        assert_eq!(recent[0].status, SendStatus::AutoClickFailed);
        assert_eq!(recent[0].contact_data_snapshot["firstName"], "Jane");
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_recent_respects_limit_and_ties() {
        let store = HistoryStore::in_memory().unwrap();
        let mut first = record("5551234567", SendStatus::SentAutomatically, 5);
        first.message = "first".to_string();
        let mut second = record("5551234567", SendStatus::SentAutomatically, 5);
        second.message = "second".to_string();
        store.append(&first).unwrap();
        store.append(&second).unwrap();

        let recent = store.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "second");
    }

    #[test]
    fn test_for_phone_filters() {
        let store = HistoryStore::in_memory().unwrap();
        store.append(&record("5551234567", SendStatus::SentAutomatically, 1)).unwrap();
        store.append(&record("5559876543", SendStatus::Failed, 2)).unwrap();

        let records = store.for_phone("5559876543", 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, SendStatus::Failed);
    }

    #[test]
    fn test_round_trips_optional_columns() {
        let store = HistoryStore::in_memory().unwrap();
        let mut failed = record("5551234567", SendStatus::AutoClickFailed, 1);
        failed.strategy = None;
        failed.error = Some("no send control".to_string());
        failed.contact_ref = Some("contact-9".to_string());
        failed.evidence = vec!["/tmp/e/hierarchy.xml".to_string(), "/tmp/e/screenshot.png".to_string()];
        store.append(&failed).unwrap();

        let loaded = store.recent(1).unwrap().remove(0);
        assert_eq!(loaded, failed);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        let store = HistoryStore::open(&path).unwrap();
        store.append(&record("5551234567", SendStatus::SentAutomatically, 1)).unwrap();
        drop(store);

        let reopened = HistoryStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
