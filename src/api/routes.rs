use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};
use crate::triggers::task_committed;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Task-mutation trigger, called by the CRUD write path
        .nest(
            "/api/v1",
            Router::new()
                .route("/tasks/events", post(task_committed))
                .layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
