mod settings;

pub use settings::{
    ApiConfig, DirectoryConfig, JwtConfig, ServerConfig, Settings, TenantEntry, UserEntry,
    WebSocketConfig,
};
