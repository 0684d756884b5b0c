use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Depth of each connection's outbound buffer; a full buffer drops
    /// the newest event for that connection
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Connection timeout in seconds (disconnect if no inbound activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Idle-sweeper interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
}

fn default_outbound_buffer() -> usize {
    32
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_sweep_interval() -> u64 {
    60 // 1 minute
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API key required on the task-event trigger endpoints.
    /// When unset, the endpoints are open (development mode).
    pub key: Option<String>,
}

/// Static user/tenant records backing the directory collaborator.
/// A deployment against a real identity store swaps the implementation
/// behind the `Directory` trait; the records here come from config files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub tenants: Vec<TenantEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub id: String,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantEntry {
    pub id: String,
    pub name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("websocket.outbound_buffer", 32)?
            .set_default("websocket.connection_timeout", 120)?
            .set_default("websocket.sweep_interval", 60)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, JWT_SECRET, API_KEY, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            connection_timeout: default_connection_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }
}
