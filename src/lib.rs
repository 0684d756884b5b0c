// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules
pub use infrastructure::auth;
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;

// Domain layer (business logic)
pub mod connections;
pub mod directory;
pub mod events;
pub mod fanout;
pub mod publisher;

// Application layer
pub mod api;
pub mod server;
pub mod triggers;
pub mod websocket;

// Supporting modules
pub mod tasks;
