//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connections::RegistryStats;
use crate::fanout::BroadcasterStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub tenants: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: RegistryStats,
    pub events: BroadcasterStatsSnapshot,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = state.start_time.elapsed().as_secs();
    let registry_stats = state.registry.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        connections: ConnectionHealthResponse {
            total: registry_stats.total_connections,
            tenants: registry_stats.tenants.len(),
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.registry.stats(),
        events: state.broadcaster.stats(),
    })
}
