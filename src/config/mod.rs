// Configuration module entry point
// Manages application configuration and runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{Config, StorageConfig};

pub const DEFAULT_PORT: u16 = 24732;
const DEFAULT_CONFIG_NAME: &str = "config";
const SERVER_ID: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

impl Config {
    /// Load configuration from specified file path (with or without extension)
    ///
    /// Without a path, an optional `config.toml` next to the binary is used.
    /// `RELAY_*` variables override the file and `PORT` overrides everything.
    pub fn load_from(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let file_source = match config_path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", DEFAULT_PORT)?
            .set_default("storage.upload_dir", "uploads")?
            .set_default("storage.map_file", "map.json")?
            .set_default("storage.public_dir", "public")?
            .set_default("link.prefix", "mahabub")?
            .set_default("link.extension", "mp4")?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("http.server_name", SERVER_ID)?
            .set_default("http.enable_cors", true)?
            .set_default("http.max_body_size", 2_147_483_648_i64)? // 2GB
            .set_default("http.user_agent", SERVER_ID)?
            .set_default("performance.keep_alive", true)?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
