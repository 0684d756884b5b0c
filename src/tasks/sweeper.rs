use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connections::ConnectionRegistry;

/// Background task that reclaims connections with no inbound activity.
///
/// An idle connection gets its close signal raised and is unregistered;
/// its pump observes the signal and tears the socket down. Client `ping`
/// keepalives refresh the activity clock and keep a connection alive.
pub struct IdleSweeper {
    config: WebSocketConfig,
    registry: Arc<ConnectionRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl IdleSweeper {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<ConnectionRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let sweep_interval = Duration::from_secs(self.config.sweep_interval);
        let connection_timeout = self.config.connection_timeout;

        let mut sweep_timer = tokio::time::interval(sweep_interval);

        // Skip immediate first tick
        sweep_timer.tick().await;

        tracing::info!(
            sweep_interval_secs = self.config.sweep_interval,
            connection_timeout_secs = connection_timeout,
            "Idle sweeper started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Idle sweeper received shutdown signal");
                    break;
                }
                _ = sweep_timer.tick() => {
                    self.sweep(connection_timeout);
                }
            }
        }

        tracing::info!("Idle sweeper stopped");
    }

    fn sweep(&self, timeout_secs: u64) {
        let idle = self.registry.find_idle_connections(timeout_secs);
        if idle.is_empty() {
            return;
        }

        let count = idle.len();
        for connection_id in idle {
            tracing::info!(
                connection_id = %connection_id,
                "Removing idle connection"
            );
            if let Some(handle) = self.registry.get_connection(connection_id) {
                handle.close();
            }
            self.registry.unregister(connection_id);
        }

        tracing::info!(removed = count, "Idle sweep complete");
    }
}
