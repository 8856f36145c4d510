use serde::Serialize;

use super::message::OutboundMessage;
use crate::device::Device;
use crate::history::HistoryRecord;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Whether an attempt currently holds the active device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_busy: Option<bool>,
    /// Connected WebSocket clients
    pub clients: usize,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub recipient: String,
    pub body: String,
    pub characters: usize,
}

impl From<&OutboundMessage> for PreviewResponse {
    fn from(message: &OutboundMessage) -> Self {
        Self {
            recipient: message.recipient().to_string(),
            body: message.body().to_string(),
            characters: message.char_count(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotResponse {
    pub device_id: String,
    pub width: u32,
    pub height: u32,
    /// Base64-encoded PNG
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub records: Vec<HistoryRecord>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchResponse {
    pub batch_id: String,
    pub status: String,
    pub total: usize,
}
