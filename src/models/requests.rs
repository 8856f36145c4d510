use serde::Deserialize;

use super::message::ContactFields;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Defaults to the first authorized device
    pub device_id: Option<String>,
}

/// Body of `/messages/send` and `/messages/preview`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub recipient: String,
    pub template: String,
    #[serde(default)]
    pub fields: ContactFields,
    pub contact_ref: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
    /// Any formatting is accepted; it is normalized before matching
    pub phone: Option<String>,
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecipient {
    pub recipient: String,
    #[serde(default)]
    pub fields: ContactFields,
    pub contact_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchRequest {
    pub template: String,
    pub recipients: Vec<BatchRecipient>,
    /// Overrides the configured pause between messages
    pub delay_ms: Option<u64>,
}
