//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{EVENTS_BROADCAST_TOTAL, EVENTS_DELIVERED_TOTAL, EVENTS_DROPPED_TOTAL, WS_MESSAGES_RECEIVED};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording broadcast metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record_broadcast(kind: &str) {
        EVENTS_BROADCAST_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_delivered(count: u64) {
        EVENTS_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_dropped(count: u64) {
        EVENTS_DROPPED_TOTAL.inc_by(count);
    }
}

/// Helper struct for recording inbound WebSocket message metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_ping() {
        WS_MESSAGES_RECEIVED.with_label_values(&["ping"]).inc();
    }

    pub fn record_ignored() {
        WS_MESSAGES_RECEIVED.with_label_values(&["ignored"]).inc();
    }
}
