//! Relay core
//!
//! Short-link bookkeeping and file ingestion:
//! - `token`: four-letter identifiers, unique against the current table
//! - `store`: the persisted token -> stored filename table
//! - `ingest`: direct uploads and remote-URL fetches streamed to disk
//! - `retrieve`: token resolution back to an open file

pub mod ingest;
pub mod retrieve;
pub mod store;
pub mod token;

use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::config::StorageConfig;
use crate::error::RelayError;

pub use ingest::Ingested;
pub use retrieve::ResolvedFile;
pub use store::MappingStore;

/// Storage directory, mapping store and the HTTP client used for remote fetches
#[derive(Debug, Clone)]
pub struct Relay {
    store: MappingStore,
    upload_dir: PathBuf,
    client: reqwest::Client,
}

impl Relay {
    /// Prepare storage: create the upload directory and an empty table on first run
    pub async fn open(storage: &StorageConfig, client: reqwest::Client) -> Result<Self, RelayError> {
        fs::create_dir_all(&storage.upload_dir).await?;
        let store = MappingStore::open(&storage.map_file).await?;
        Ok(Self {
            store,
            upload_dir: storage.upload_dir.clone(),
            client,
        })
    }

    pub const fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Location of a stored file, or `None` if the name would leave the upload directory
    fn stored_path(&self, stored_name: &str) -> Option<PathBuf> {
        let mut components = Path::new(stored_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.upload_dir.join(stored_name)),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Relay rooted in a fresh temporary directory
    pub async fn temp_relay() -> (tempfile::TempDir, Relay) {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            upload_dir: dir.path().join("uploads"),
            map_file: dir.path().join("map.json"),
            public_dir: dir.path().join("public"),
        };
        let relay = Relay::open(&storage, reqwest::Client::new()).await.unwrap();
        (dir, relay)
    }

    pub fn stored_files(relay: &Relay) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(relay.upload_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
