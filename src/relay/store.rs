//! Mapping store
//!
//! Persists the token -> stored filename table as a single JSON object.
//! The whole table is read on every access and rewritten on every mutation;
//! nothing is cached between requests.
//!
//! Mutations are plain load-modify-save cycles without locking. Two
//! registrations that overlap can lose one of the new entries (the file
//! stays on disk, only its token is lost).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::token;
use crate::error::RelayError;

/// Token -> stored filename
pub type Mapping = BTreeMap<String, String>;

/// File-backed mapping store
#[derive(Debug, Clone)]
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    /// Open the store, writing an empty table if the backing file is absent
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RelayError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        if !fs::try_exists(&path).await? {
            fs::write(&path, "{}").await?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full table
    ///
    /// Content that is not a JSON object of strings yields `RelayError::Corrupted`.
    pub async fn load(&self) -> Result<Mapping, RelayError> {
        let raw = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Overwrite the backing file with `mapping`. Not atomic.
    pub async fn save(&self, mapping: &Mapping) -> Result<(), RelayError> {
        let json = serde_json::to_string_pretty(mapping)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Register `stored_name` under a fresh token and persist the table
    pub async fn register(&self, stored_name: &str) -> Result<String, RelayError> {
        let mut mapping = self.load().await?;
        let token = token::generate_unique(&mapping);
        mapping.insert(token.clone(), stored_name.to_string());
        self.save(&mapping).await?;
        Ok(token)
    }

    pub async fn lookup(&self, token: &str) -> Result<Option<String>, RelayError> {
        Ok(self.load().await?.remove(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, MappingStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MappingStore::open(dir.path().join("state").join("map.json"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_creates_empty_table() {
        let (_dir, store) = temp_store().await;
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "{}");
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_keeps_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, r#"{"AbCd":"1700000000000_clip.mp4"}"#).unwrap();

        let store = MappingStore::open(&path).await.unwrap();
        let mapping = store.load().await.unwrap();
        assert_eq!(mapping.get("AbCd").map(String::as_str), Some("1700000000000_clip.mp4"));
    }

    #[tokio::test]
    async fn test_save_writes_pretty_json() {
        let (_dir, store) = temp_store().await;
        let mut mapping = Mapping::new();
        mapping.insert("xYzW".to_string(), "1_a.txt".to_string());
        store.save(&mapping).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "{\n  \"xYzW\": \"1_a.txt\"\n}");
        assert_eq!(store.load().await.unwrap(), mapping);
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let (_dir, store) = temp_store().await;
        let first = store.register("1_a.bin").await.unwrap();
        let second = store.register("2_b.bin").await.unwrap();
        assert_ne!(first, second);

        assert_eq!(store.lookup(&first).await.unwrap().as_deref(), Some("1_a.bin"));
        assert_eq!(store.lookup(&second).await.unwrap().as_deref(), Some("2_b.bin"));
        assert_eq!(store.lookup("ZZZZ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupted_table_is_reported() {
        let (_dir, store) = temp_store().await;
        std::fs::write(store.path(), "{not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, RelayError::Corrupted(_)));
        assert!(matches!(
            store.register("1_a.bin").await.unwrap_err(),
            RelayError::Corrupted(_)
        ));
    }

    #[tokio::test]
    async fn test_interleaved_registrations_lose_an_update() {
        let (_dir, store) = temp_store().await;

        // Both ingestions load before either saves
        let mut first = store.load().await.unwrap();
        let mut second = store.load().await.unwrap();

        let first_token = token::generate_unique(&first);
        first.insert(first_token.clone(), "1_first.bin".to_string());
        let second_token = loop {
            let candidate = token::generate_unique(&second);
            if candidate != first_token {
                break candidate;
            }
        };
        second.insert(second_token.clone(), "2_second.bin".to_string());

        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let merged = store.load().await.unwrap();
        let survivors = [&first_token, &second_token]
            .iter()
            .filter(|t| merged.contains_key(t.as_str()))
            .count();
        assert_eq!(survivors, 1, "last writer wins, one token is lost");
        assert!(!merged.contains_key(&first_token));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_lose_an_update() {
        let (_dir, store) = temp_store().await;

        // Both loads are in flight before either save starts
        let (first, second) = tokio::join!(store.register("1_first.bin"), store.register("2_second.bin"));
        let (first, second) = (first.unwrap(), second.unwrap());

        let merged = store.load().await.unwrap();
        let survivors = [&first, &second]
            .iter()
            .filter(|t| merged.contains_key(t.as_str()))
            .count();
        assert_eq!(survivors, 1, "one of the two registrations is lost");
        assert_eq!(merged.len(), 1);
    }
}
