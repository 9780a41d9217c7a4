// Application state module
// Shared by every connection task

use super::types::Config;
use crate::error::RelayError;
use crate::logger;
use crate::relay::Relay;

/// Application state
pub struct AppState {
    pub config: Config,
    pub relay: Relay,
}

impl AppState {
    /// Prepare storage and the outbound HTTP client
    pub async fn new(config: Config) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .user_agent(config.http.user_agent.clone())
            .build()?;
        let relay = Relay::open(&config.storage, client).await?;
        logger::log_storage_ready(relay.upload_dir(), relay.store().path());
        Ok(Self { config, relay })
    }
}
