use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use std::time::Duration;

use crate::automation::{BatchHandle, BatchProgress};
use crate::error::{AppError, Result};
use crate::models::{StartBatchRequest, StartBatchResponse};

use super::super::state::{AppState, FINISHED_BATCH_RETENTION};

/// Start sending to every recipient in order
pub async fn start_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartBatchRequest>,
) -> Result<(StatusCode, Json<StartBatchResponse>)> {
    if request.recipients.is_empty() {
        return Err(AppError::ValidationError("Batch has no recipients".to_string()));
    }
    if request.template.trim().is_empty() {
        return Err(AppError::ValidationError("Template is empty".to_string()));
    }

    state.prune_finished_batches(FINISHED_BATCH_RETENTION).await;

    let total = request.recipients.len();
    let handle = state.start_batch(
        request.template,
        request.recipients,
        request.delay_ms.map(Duration::from_millis),
    );

    tracing::info!("Batch {} accepted with {} recipients", handle.id(), total);
    Ok((
        StatusCode::ACCEPTED,
        Json(StartBatchResponse {
            batch_id: handle.id().to_string(),
            status: handle.progress().await.status.as_str().to_string(),
            total,
        }),
    ))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchProgress>> {
    let handle = find(&state, &batch_id)?;
    Ok(Json(handle.progress().await))
}

/// Takes effect before the next attempt
pub async fn pause_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchProgress>> {
    let handle = find(&state, &batch_id)?;
    handle.pause();
    Ok(Json(handle.progress().await))
}

pub async fn resume_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchProgress>> {
    let handle = find(&state, &batch_id)?;
    handle.resume();
    Ok(Json(handle.progress().await))
}

/// Takes effect before the next attempt; the one in flight completes
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchProgress>> {
    let handle = find(&state, &batch_id)?;
    handle.cancel();
    Ok(Json(handle.progress().await))
}

fn find(state: &AppState, batch_id: &str) -> Result<Arc<BatchHandle>> {
    state
        .batch(batch_id)
        .ok_or_else(|| AppError::NotFound(format!("Batch {} not found", batch_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::device::testing::FakeBridge;
    use crate::history::HistoryStore;
    use crate::models::{BatchRecipient, ContactFields};
    use axum::response::IntoResponse;

    fn state() -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.evidence_dir = dir.path().to_path_buf();
        config.automation = config.automation.without_waits();
        let state = AppState::with_parts(
            Arc::new(FakeBridge::new()),
            HistoryStore::in_memory().unwrap(),
            &config,
        );
        (Arc::new(state), dir)
    }

    #[tokio::test]
    async fn test_unknown_batch_is_not_found() {
        let (state, _dir) = state();
        let err = get_batch(State(state), Path("missing".to_string())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let (state, _dir) = state();
        let request = StartBatchRequest {
            template: "Hi".to_string(),
            recipients: Vec::new(),
            delay_ms: None,
        };
        let err = start_batch(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_started_batch_is_tracked() {
        let (state, _dir) = state();
        let request = StartBatchRequest {
            template: "Hi {firstName}".to_string(),
            recipients: vec![BatchRecipient {
                recipient: "5551234567".to_string(),
                fields: ContactFields::default().with_first_name("Jane"),
                contact_ref: None,
            }],
            delay_ms: Some(0),
        };

        let (status, Json(started)) = start_batch(State(state.clone()), Json(request)).await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(started.total, 1);

        let Json(progress) = get_batch(State(state), Path(started.batch_id.clone())).await.unwrap();
        assert_eq!(progress.batch_id, started.batch_id);
        assert_eq!(progress.total, 1);
    }

    #[tokio::test]
    async fn test_finished_batches_are_pruned() {
        let (state, _dir) = state();
        let handle = state.start_batch(
            "Hi".to_string(),
            vec![BatchRecipient {
                recipient: "123".to_string(),
                fields: ContactFields::default(),
                contact_ref: None,
            }],
            Some(Duration::ZERO),
        );

        let finished = async {
            while !handle.progress().await.status.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), finished).await.unwrap();

        // Still within retention
        assert_eq!(state.prune_finished_batches(FINISHED_BATCH_RETENTION).await, 0);
        assert!(state.batch(handle.id()).is_some());

        assert_eq!(state.prune_finished_batches(Duration::ZERO).await, 1);
        let err = get_batch(State(state), Path(handle.id().to_string())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
