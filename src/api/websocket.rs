use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use super::state::{AppState, WsEvent};
use crate::automation::BatchEvent;

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(rename = "type")]
    msg_type: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct WsOutgoing {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempt: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<WsEvent> for WsOutgoing {
    fn from(event: WsEvent) -> Self {
        match event {
            WsEvent::Attempt(attempt) => WsOutgoing {
                msg_type: "attempt".to_string(),
                attempt: Some(serde_json::to_value(&attempt).unwrap_or_default()),
                ..Default::default()
            },
            WsEvent::Batch(BatchEvent::Attempt {
                batch_id,
                index,
                attempt,
            }) => WsOutgoing {
                msg_type: "batch_attempt".to_string(),
                batch_id: Some(batch_id),
                index: Some(index),
                attempt: Some(serde_json::to_value(&attempt).unwrap_or_default()),
                ..Default::default()
            },
            WsEvent::Batch(BatchEvent::Rejected {
                batch_id,
                index,
                recipient,
                error,
            }) => WsOutgoing {
                msg_type: "batch_rejected".to_string(),
                batch_id: Some(batch_id),
                index: Some(index),
                recipient: Some(recipient),
                error: Some(error),
                ..Default::default()
            },
            WsEvent::Batch(BatchEvent::Progress(progress)) => WsOutgoing {
                msg_type: "batch_progress".to_string(),
                batch_id: Some(progress.batch_id.clone()),
                progress: Some(serde_json::to_value(&progress).unwrap_or_default()),
                ..Default::default()
            },
        }
    }
}

impl WsOutgoing {
    fn pong() -> Self {
        WsOutgoing {
            msg_type: "pong".to_string(),
            ..Default::default()
        }
    }
}

/// Next broadcast event; a slow client skips what it missed instead of disconnecting
async fn next_event(rx: &mut broadcast::Receiver<WsEvent>, client_id: &str) -> Option<WsEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Client {} lagged, skipped {} events", client_id, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request from client: {}", client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    state.client_connected(&client_id);

    let (mut sender, mut receiver) = socket.split();

    // Subscribe to broadcast events
    let mut rx = state.subscribe();

    // Pongs go only to the client that pinged
    let (pong_tx, mut pong_rx) = mpsc::channel::<()>(8);

    // Task to forward broadcast events and pongs to this client
    let forward_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                event = next_event(&mut rx, &forward_id) => match event {
                    Some(event) => WsOutgoing::from(event),
                    None => break,
                },
                Some(()) = pong_rx.recv() => WsOutgoing::pong(),
            };

            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Task to handle incoming messages (ping/pong)
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(incoming) = serde_json::from_str::<WsIncoming>(&text) {
                    if incoming.msg_type == "ping" && pong_tx.send(()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Whichever task ends first takes the other down with it
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.client_disconnected(&client_id);
    tracing::info!("WebSocket disconnected: {}", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::automation::{BatchProgress, BatchStatus};

    fn progress(processed: usize) -> WsEvent {
        WsEvent::Batch(BatchEvent::Progress(BatchProgress {
            batch_id: "b1".to_string(),
            status: BatchStatus::Running,
            total: 5,
            processed,
            sent: processed,
            failed: 0,
            rejected: 0,
            current: None,
            error: None,
            started_at: chrono::Utc::now(),
            finished_at: None,
        }))
    }

    #[test]
    fn test_pong_serializes_type_only() {
        let json = serde_json::to_value(WsOutgoing::pong()).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "pong" }));
    }

    #[test]
    fn test_batch_progress_message_carries_batch_id() {
        let json = serde_json::to_value(WsOutgoing::from(progress(2))).unwrap();
        assert_eq!(json["type"], "batch_progress");
        assert_eq!(json["batchId"], "b1");
        assert_eq!(json["progress"]["processed"], 2);
    }

    #[tokio::test]
    async fn test_lagging_client_keeps_receiving() {
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(progress(1)).unwrap();
        tx.send(progress(2)).unwrap();
        tx.send(progress(3)).unwrap();

        match next_event(&mut rx, "slow").await {
            Some(WsEvent::Batch(BatchEvent::Progress(p))) => assert_eq!(p.processed, 3),
            other => panic!("unexpected event: {:?}", other),
        }

        drop(tx);
        assert!(next_event(&mut rx, "slow").await.is_none());
    }
}
