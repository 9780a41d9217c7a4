//! File ingestion
//!
//! Both entry points write the payload to `<upload_dir>/<millis>_<name>`
//! chunk by chunk, then register the stored name under a fresh token.
//! Stored files are created exclusively, so two ingestions never share one.
//! A transfer that fails midway removes its partial file and registers
//! nothing.

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use multer::Multipart;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::Relay;
use crate::error::RelayError;
use crate::logger;

/// Multipart field carrying the uploaded file
pub const UPLOAD_FIELD: &str = "file";

pub const MISSING_URL: &str = "Missing ?url=";
pub const NO_FILE_UPLOADED: &str = "No file uploaded";

const FALLBACK_REMOTE_NAME: &str = "download";
const FALLBACK_UPLOAD_NAME: &str = "upload";

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub token: String,
    pub stored_name: String,
    pub bytes: u64,
}

impl Relay {
    /// Fetch `url` and stream the response body to disk
    pub async fn ingest_remote(&self, url: Option<&str>) -> Result<Ingested, RelayError> {
        let url = url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RelayError::validation(MISSING_URL))?;
        let url = reqwest::Url::parse(url)
            .map_err(|e| RelayError::Network(format!("Invalid URL: {e}")))?;

        let basename = remote_basename(&url);

        // The file is only created once the origin has answered with a success status
        let response = self.client.get(url).send().await?.error_for_status()?;
        let (stored_name, file) = self.create_stored_file(now_millis(), &basename).await?;
        let bytes = write_stream(
            &self.upload_dir.join(&stored_name),
            file,
            response.bytes_stream(),
        )
        .await?;

        self.register(stored_name, bytes).await
    }

    /// Store the first `file` part of a multipart body
    pub async fn ingest_upload(&self, mut multipart: Multipart<'_>) -> Result<Ingested, RelayError> {
        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some(UPLOAD_FIELD) {
                continue;
            }
            // A part without a filename is a plain form value, not a file
            let Some(original) = field.file_name().map(ToString::to_string) else {
                continue;
            };

            let (stored_name, file) = self
                .create_stored_file(now_millis(), &upload_basename(&original))
                .await?;
            let bytes = write_stream(&self.upload_dir.join(&stored_name), file, field).await?;
            return self.register(stored_name, bytes).await;
        }

        Err(RelayError::validation(NO_FILE_UPLOADED))
    }

    /// Create `<millis>_<name>` exclusively
    ///
    /// A name already taken in the same millisecond gets a counter in its
    /// prefix (`<millis>-1_<name>`, `<millis>-2_<name>`, ...). An existing
    /// file is never opened for writing.
    async fn create_stored_file(
        &self,
        millis: i64,
        name: &str,
    ) -> Result<(String, fs::File), RelayError> {
        let mut attempt = 0u32;
        loop {
            let stored_name = stored_file_name(millis, attempt, name);
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.upload_dir.join(&stored_name))
                .await;
            match opened {
                Ok(file) => return Ok((stored_name, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn register(&self, stored_name: String, bytes: u64) -> Result<Ingested, RelayError> {
        let token = self.store.register(&stored_name).await?;
        logger::log_ingested(&token, &stored_name, bytes);
        Ok(Ingested {
            token,
            stored_name,
            bytes,
        })
    }
}

/// Pipe `chunks` into the freshly created `file` at `path`, holding one chunk
/// in memory at a time
///
/// Resolves once the data is flushed and synced, or with the first error.
/// On error the file at `path` is removed.
async fn write_stream<S, E>(path: &Path, mut file: fs::File, chunks: S) -> Result<u64, RelayError>
where
    S: Stream<Item = Result<Bytes, E>>,
    RelayError: From<E>,
{
    let mut chunks = std::pin::pin!(chunks);

    let outcome: Result<u64, RelayError> = async {
        let mut written = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
    .await;

    if outcome.is_err() {
        drop(file);
        if let Err(e) = fs::remove_file(path).await {
            logger::log_warning(&format!(
                "Failed to remove partial file '{}': {e}",
                path.display()
            ));
        }
    }
    outcome
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// `<millis>_<name>`, or `<millis>-<attempt>_<name>` after a clash
fn stored_file_name(millis: i64, attempt: u32, name: &str) -> String {
    if attempt == 0 {
        format!("{millis}_{name}")
    } else {
        format!("{millis}-{attempt}_{name}")
    }
}

/// Last non-empty path segment of the URL
fn remote_basename(url: &reqwest::Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or(FALLBACK_REMOTE_NAME);
    sanitize_file_name(segment, FALLBACK_REMOTE_NAME)
}

/// Final component of a client-supplied filename
fn upload_basename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(FALLBACK_UPLOAD_NAME);
    sanitize_file_name(name, FALLBACK_UPLOAD_NAME)
}

/// Keep file names to a portable character set
fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::test_support::{stored_files, temp_relay};
    use std::convert::Infallible;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOUNDARY: &str = "relay-test-boundary";

    fn multipart_from(body: String) -> Multipart<'static> {
        let stream = futures::stream::once(async move { Ok::<_, Infallible>(Bytes::from(body)) });
        Multipart::new(stream, BOUNDARY)
    }

    fn file_part(field: &str, filename: &str, content: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n"
        )
    }

    fn text_part(field: &str, value: &str) -> String {
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n")
    }

    fn closing() -> String {
        format!("--{BOUNDARY}--\r\n")
    }

    #[tokio::test]
    async fn test_remote_ingestion_streams_to_disk() {
        let origin = MockServer::start().await;
        let payload = vec![7u8; 256 * 1024];
        Mock::given(method("GET"))
            .and(path("/media/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&origin)
            .await;

        let (_dir, relay) = temp_relay().await;
        let url = format!("{}/media/clip.mp4", origin.uri());
        let ingested = relay.ingest_remote(Some(&url)).await.unwrap();

        assert_eq!(ingested.bytes, payload.len() as u64);
        assert!(ingested.stored_name.ends_with("_clip.mp4"));
        let on_disk = std::fs::read(relay.upload_dir().join(&ingested.stored_name)).unwrap();
        assert_eq!(on_disk, payload);

        let mapping = relay.store().load().await.unwrap();
        assert_eq!(mapping.get(&ingested.token), Some(&ingested.stored_name));
    }

    #[tokio::test]
    async fn test_missing_url_writes_nothing() {
        let (_dir, relay) = temp_relay().await;
        for url in [None, Some("")] {
            let err = relay.ingest_remote(url).await.unwrap_err();
            assert!(matches!(err, RelayError::Validation(ref m) if m == MISSING_URL));
        }
        assert!(stored_files(&relay).is_empty());
        assert!(relay.store().load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_is_network_error() {
        let (_dir, relay) = temp_relay().await;
        let err = relay.ingest_remote(Some("not a url")).await.unwrap_err();
        assert!(matches!(err, RelayError::Network(_)));
        assert!(stored_files(&relay).is_empty());
    }

    #[tokio::test]
    async fn test_origin_error_status_registers_nothing() {
        let origin = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&origin)
            .await;

        let (_dir, relay) = temp_relay().await;
        let url = format!("{}/gone.mp4", origin.uri());
        let err = relay.ingest_remote(Some(&url)).await.unwrap_err();

        assert!(matches!(err, RelayError::Network(ref m) if m.contains("404")));
        assert!(stored_files(&relay).is_empty());
        assert!(relay.store().load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_network_error() {
        let origin = MockServer::start().await;
        let url = format!("{}/clip.mp4", origin.uri());
        drop(origin);

        let (_dir, relay) = temp_relay().await;
        let err = relay.ingest_remote(Some(&url)).await.unwrap_err();
        assert!(matches!(err, RelayError::Network(_)));
        assert!(stored_files(&relay).is_empty());
    }

    #[tokio::test]
    async fn test_upload_stores_first_file_part() {
        let (_dir, relay) = temp_relay().await;
        let body = text_part("title", "holiday")
            + &file_part("file", "clip.mp4", "first payload")
            + &file_part("file", "other.mp4", "second payload")
            + &closing();

        let ingested = relay.ingest_upload(multipart_from(body)).await.unwrap();

        assert!(ingested.stored_name.ends_with("_clip.mp4"));
        assert_eq!(ingested.bytes, "first payload".len() as u64);
        assert_eq!(stored_files(&relay), vec![ingested.stored_name.clone()]);
        let on_disk = std::fs::read_to_string(relay.upload_dir().join(&ingested.stored_name)).unwrap();
        assert_eq!(on_disk, "first payload");
    }

    #[tokio::test]
    async fn test_upload_without_file_part() {
        let (_dir, relay) = temp_relay().await;
        let body = text_part("file", "not a file") + &text_part("title", "x") + &closing();

        let err = relay.ingest_upload(multipart_from(body)).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(ref m) if m == NO_FILE_UPLOADED));
        assert!(relay.store().load().await.unwrap().is_empty());
        assert!(stored_files(&relay).is_empty());
    }

    #[tokio::test]
    async fn test_truncated_upload_removes_partial_file() {
        let (_dir, relay) = temp_relay().await;
        // No closing boundary: the part never terminates
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cut.bin\"\r\n\r\nhalf of the"
        );

        let err = relay.ingest_upload(multipart_from(body)).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert!(stored_files(&relay).is_empty());
        assert!(relay.store().load().await.unwrap().is_empty());
    }

    #[test]
    fn test_remote_basename() {
        let url = reqwest::Url::parse("https://cdn.example.com/a/b/video.mp4?sig=1").unwrap();
        assert_eq!(remote_basename(&url), "video.mp4");

        let url = reqwest::Url::parse("https://cdn.example.com/a/dir/").unwrap();
        assert_eq!(remote_basename(&url), "dir");

        let url = reqwest::Url::parse("https://cdn.example.com").unwrap();
        assert_eq!(remote_basename(&url), "download");

        let url = reqwest::Url::parse("https://cdn.example.com/my%20clip.mp4").unwrap();
        assert_eq!(remote_basename(&url), "my_20clip.mp4");
    }

    #[test]
    fn test_upload_basename() {
        assert_eq!(upload_basename("clip.mp4"), "clip.mp4");
        assert_eq!(upload_basename("../../etc/passwd"), "passwd");
        assert_eq!(upload_basename("holiday photo.jpg"), "holiday_photo.jpg");
        assert_eq!(upload_basename(".."), "upload");
        assert_eq!(upload_basename(""), "upload");
    }

    #[test]
    fn test_stored_file_name() {
        assert_eq!(stored_file_name(1_700_000_000_000, 0, "clip.mp4"), "1700000000000_clip.mp4");
        assert_eq!(stored_file_name(1_700_000_000_000, 2, "clip.mp4"), "1700000000000-2_clip.mp4");

        let name = stored_file_name(now_millis(), 0, "clip.mp4");
        let (millis, rest) = name.split_once('_').unwrap();
        assert_eq!(rest, "clip.mp4");
        assert!(millis.parse::<i64>().unwrap() > 1_600_000_000_000);
    }

    #[tokio::test]
    async fn test_same_millisecond_names_do_not_clash() {
        let (_dir, relay) = temp_relay().await;
        std::fs::write(relay.upload_dir().join("42_clip.mp4"), b"already here").unwrap();

        let (first, _file) = relay.create_stored_file(42, "clip.mp4").await.unwrap();
        let (second, _file) = relay.create_stored_file(42, "clip.mp4").await.unwrap();
        assert_eq!(first, "42-1_clip.mp4");
        assert_eq!(second, "42-2_clip.mp4");

        // The existing file is left untouched
        let existing = std::fs::read(relay.upload_dir().join("42_clip.mp4")).unwrap();
        assert_eq!(existing, b"already here");
    }

    #[tokio::test]
    async fn test_repeated_uploads_keep_their_own_bytes() {
        let (_dir, relay) = temp_relay().await;
        let mut uploads = Vec::new();
        for i in 0..20 {
            let content = format!("payload number {i}");
            let body = file_part("file", "clip.mp4", &content) + &closing();
            let ingested = relay.ingest_upload(multipart_from(body)).await.unwrap();
            uploads.push((ingested, content));
        }

        assert_eq!(stored_files(&relay).len(), uploads.len());
        for (ingested, content) in uploads {
            let mut resolved = relay.resolve(&ingested.token).await.unwrap();
            assert_eq!(resolved.stored_name, ingested.stored_name);
            let mut on_disk = String::new();
            tokio::io::AsyncReadExt::read_to_string(&mut resolved.file, &mut on_disk)
                .await
                .unwrap();
            assert_eq!(on_disk, content);
        }
    }
}
