//! HTTP trigger called by the CRUD write path after a task commit.
//!
//! This is the out-of-process face of `TaskEventPublisher::on_task_committed`:
//! the CRUD service posts the committed task's tenant id and snapshot here
//! once the write is durable. Fanout trouble never surfaces as a request
//! failure; the mutation already happened.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::events::TaskEventKind;
use crate::server::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct TaskCommittedRequest {
    pub tenant_id: String,
    pub event_type: TaskEventKind,
    pub task: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct TaskCommittedResponse {
    pub accepted: bool,
    pub delivered_to: usize,
    pub dropped: usize,
    pub timestamp: DateTime<Utc>,
}

/// Accept a committed task mutation and fan it out to the tenant's
/// connections.
#[tracing::instrument(
    name = "http.task_committed",
    skip(state, request),
    fields(tenant_id = %request.tenant_id, event_type = %request.event_type)
)]
pub async fn task_committed(
    State(state): State<AppState>,
    Json(request): Json<TaskCommittedRequest>,
) -> Result<Json<TaskCommittedResponse>> {
    if request.tenant_id.is_empty() {
        return Err(AppError::Validation("tenant_id must not be empty".into()));
    }
    if !request.task.is_object() {
        return Err(AppError::Validation(
            "task must be a serialized task object".into(),
        ));
    }

    let report =
        state
            .publisher
            .on_task_committed(&request.tenant_id, request.task, request.event_type);

    Ok(Json(TaskCommittedResponse {
        accepted: true,
        delivered_to: report.delivered,
        dropped: report.dropped,
        timestamp: Utc::now(),
    }))
}
