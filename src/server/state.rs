use std::sync::Arc;
use std::time::Instant;

use crate::auth::TokenValidator;
use crate::config::Settings;
use crate::connections::ConnectionRegistry;
use crate::directory::{Directory, StaticDirectory};
use crate::fanout::EventBroadcaster;
use crate::publisher::TaskEventPublisher;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub token_validator: Arc<TokenValidator>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub publisher: Arc<TaskEventPublisher>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let directory: Arc<dyn Directory> =
            Arc::new(StaticDirectory::from_config(&settings.directory));
        Self::with_directory(settings, directory)
    }

    /// Construct with an explicit directory implementation. The registry
    /// and broadcaster are owned here and injected everywhere else; there
    /// is no process-wide singleton.
    pub fn with_directory(settings: Settings, directory: Arc<dyn Directory>) -> Self {
        let token_validator = Arc::new(TokenValidator::new(&settings.jwt, directory));
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new(registry.clone()));
        let publisher = Arc::new(TaskEventPublisher::new(broadcaster.clone()));

        Self {
            settings: Arc::new(settings),
            token_validator,
            registry,
            broadcaster,
            publisher,
            start_time: Instant::now(),
        }
    }
}
