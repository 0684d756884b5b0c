//! Prometheus metrics for the task-events service.
//!
//! - Connection metrics (active connections, tenants with members)
//! - Broadcast metrics (events broadcast, delivered, dropped)
//! - WebSocket message metrics (inbound frames by outcome)

mod helpers;

pub use helpers::{encode_metrics, BroadcastMetrics, WsMessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "task_events";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total number of active WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Total number of active WebSocket connections"
    ).unwrap();

    /// Number of tenants with at least one live connection
    pub static ref TENANTS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_tenants_active", METRIC_PREFIX),
        "Number of tenants with at least one live connection"
    ).unwrap();

    /// Total WebSocket connections opened since startup
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// Total WebSocket connections closed since startup
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection lifetime distribution
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 21600.0]
    ).unwrap();

    /// Handshakes rejected at authentication
    pub static ref AUTH_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_auth_rejected_total", METRIC_PREFIX),
        "WebSocket handshakes rejected at authentication"
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    /// Task events broadcast, by event kind
    pub static ref EVENTS_BROADCAST_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_broadcast_total", METRIC_PREFIX),
        "Task-mutation events broadcast",
        &["kind"]
    ).unwrap();

    /// Per-connection deliveries that reached the outbound buffer
    pub static ref EVENTS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_delivered_total", METRIC_PREFIX),
        "Per-connection event deliveries accepted into outbound buffers"
    ).unwrap();

    /// Per-connection deliveries dropped (full buffer or closing connection)
    pub static ref EVENTS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Per-connection event deliveries dropped"
    ).unwrap();

    // ============================================================================
    // WebSocket Message Metrics
    // ============================================================================

    /// Inbound WebSocket frames by outcome
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Inbound WebSocket messages",
        &["outcome"]
    ).unwrap();
}
