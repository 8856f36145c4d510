use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{SendAttempt, SendStatus};

/// Persisted projection of a completed [`SendAttempt`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub attempt_id: String,
    pub phone_number: String,
    pub message: String,
    pub status: SendStatus,
    pub timestamp: DateTime<Utc>,
    pub contact_data_snapshot: Value,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

impl HistoryRecord {
    pub fn from_attempt(attempt: &SendAttempt) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            attempt_id: attempt.id.clone(),
            phone_number: attempt.message.recipient().to_string(),
            message: attempt.message.body().to_string(),
            status: attempt.status,
            timestamp: attempt.completed_at,
            contact_data_snapshot: serde_json::to_value(attempt.message.contact())
                .unwrap_or(Value::Null),
            device_id: attempt.device.id.clone(),
            contact_ref: attempt.message.contact_ref().map(str::to_string),
            strategy: attempt.strategy_used.map(|t| t.as_str().to_string()),
            error: attempt.error.clone(),
            evidence: attempt.evidence.clone(),
        }
    }
}
