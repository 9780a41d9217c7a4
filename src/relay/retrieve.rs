//! Token resolution
//!
//! A link segment such as `AbCd.mp4` resolves to the file stored under
//! `AbCd`. An unknown token and a vanished file are reported with
//! different messages.

use std::io::ErrorKind;
use tokio::fs;

use super::{token, Relay};
use crate::error::RelayError;

/// An opened stored file, ready to be streamed
#[derive(Debug)]
pub struct ResolvedFile {
    pub token: String,
    pub stored_name: String,
    pub file: fs::File,
    pub len: u64,
}

impl Relay {
    pub async fn resolve(&self, segment: &str) -> Result<ResolvedFile, RelayError> {
        let token = token::strip_suffix(segment);
        let stored_name = self
            .store
            .lookup(token)
            .await?
            .ok_or(RelayError::NotFound(RelayError::INVALID_LINK))?;

        let path = self
            .stored_path(&stored_name)
            .ok_or(RelayError::NotFound(RelayError::FILE_NOT_FOUND))?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RelayError::NotFound(RelayError::FILE_NOT_FOUND));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(RelayError::NotFound(RelayError::FILE_NOT_FOUND));
        }

        Ok(ResolvedFile {
            token: token.to_string(),
            stored_name,
            file,
            len: metadata.len(),
        })
    }
}
