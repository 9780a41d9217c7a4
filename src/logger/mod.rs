//! Logger module
//!
//! Thin layer of named log events over `tracing`:
//! - Server lifecycle logging
//! - Ingestion and resolution events
//! - Access logging with multiple formats
//! - Error and warning logging

mod format;

pub use format::{AccessLogEntry, RequestLine};

use crate::config::Config;
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber
///
/// `RUST_LOG` takes precedence over `logging.level`. Should be called once
/// at application startup.
pub fn init(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    tracing::info!("🔥 Server running → http://localhost:{}", addr.port());
    tracing::info!(
        listen = %addr,
        link_prefix = %config.link.prefix,
        workers = ?config.server.workers,
        max_connections = ?config.performance.max_connections,
        "relay configuration"
    );
}

pub fn log_storage_ready(upload_dir: &Path, map_file: &Path) {
    tracing::info!(
        upload_dir = %upload_dir.display(),
        map_file = %map_file.display(),
        "storage ready"
    );
}

pub fn log_ingested(token: &str, stored_name: &str, bytes: u64) {
    tracing::info!(token, stored_name, bytes, "file ingested");
}

pub fn log_served(token: &str, stored_name: &str, bytes: u64) {
    tracing::debug!(token, stored_name, bytes, "serving stored file");
}

pub fn log_resolve_miss(segment: &str, reason: &str) {
    tracing::debug!(segment, reason, "short link not resolved");
}

pub fn log_request_failed(path: &str, message: &str) {
    tracing::warn!(path, "request failed: {message}");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    tracing::debug!(peer = %peer_addr, "connection accepted");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::error!("Failed to serve connection: {err:?}");
}

pub fn log_error(message: &str) {
    tracing::error!("{message}");
}

pub fn log_warning(message: &str) {
    tracing::warn!("{message}");
}

pub fn log_shutdown(reason: &str) {
    tracing::info!("Shutting down: {reason}");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: "access", "{}", entry.format(format));
}
