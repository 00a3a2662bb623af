use crate::env;
use crate::suspend::metadata::SessionRecord;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Errors specific to log store keys
#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// Durable byte storage for suspended-session output plus JSON sidecar records.
///
/// Logs are keyed by log key, sidecars by suspend id. The store knows nothing
/// about SSH; both are opaque non-empty strings, percent-encoded into file
/// stems so no key can name a path outside the directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    data_dir: PathBuf,
    max_log_bytes: u64,
}

impl LogStore {
    pub fn new(data_dir: PathBuf, max_log_bytes: u64) -> Self {
        Self {
            data_dir,
            max_log_bytes,
        }
    }

    /// Whether `key` can be stored at all.
    pub fn is_valid_key(key: &str) -> bool {
        encode_key(key).is_ok()
    }

    /// Create the storage directory if missing. Failures are only logged;
    /// the next real operation reports them.
    pub async fn ensure_directory(&self) {
        match async_fs::create_dir_all(&self.data_dir).await {
            Ok(()) => debug!("Log directory ready: {}", self.data_dir.display()),
            Err(e) => error!(
                "Failed to create log directory {}: {}",
                self.data_dir.display(),
                e
            ),
        }
    }

    /// Create an empty log for `key` without touching existing content.
    pub async fn touch(&self, key: &str) -> Result<()> {
        let path = self.log_path(key)?;
        async_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        Ok(())
    }

    /// Append a chunk of output.
    ///
    /// If the file has already reached the size ceiling it is truncated and
    /// restarted with just this chunk.
    pub async fn append(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.log_path(key)?;

        let current_size = match async_fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat log file: {}", path.display()));
            }
        };

        if current_size >= self.max_log_bytes {
            info!(
                "Log {} reached {} bytes, restarting it",
                key, current_size
            );
            async_fs::write(&path, data)
                .await
                .with_context(|| format!("Failed to rotate log file: {}", path.display()))?;
            return Ok(());
        }

        let mut file = async_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        file.write_all(data)
            .await
            .with_context(|| format!("Failed to append to log file: {}", path.display()))?;
        file.flush().await.context("Failed to flush log file")?;

        Ok(())
    }

    /// Read the whole log. A missing file reads as empty.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.log_path(key)?;
        match async_fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read log file: {}", path.display())),
        }
    }

    /// Delete a log. Deleting a missing log succeeds.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.log_path(key)?;
        remove_if_exists(&path).await
    }

    /// Persist a sidecar record, replacing any previous one atomically.
    pub async fn write_metadata(&self, record: &SessionRecord) -> Result<()> {
        let suspend_id = record.suspend_id.to_string();
        let path = self.metadata_path(&suspend_id)?;
        // Unique per write so concurrent writers never share a temp file.
        let temp_path = path.with_extension(format!(
            "{}.{}",
            uuid::Uuid::new_v4().simple(),
            env::suspend::TEMP_FILE_EXTENSION
        ));

        let serialized =
            serde_json::to_vec_pretty(record).context("Failed to serialize session metadata")?;

        let mut file = async_fs::File::create(&temp_path)
            .await
            .context("Failed to create metadata temp file")?;
        file.write_all(&serialized)
            .await
            .context("Failed to write session metadata")?;
        file.sync_all()
            .await
            .context("Failed to sync metadata file")?;
        drop(file);

        async_fs::rename(&temp_path, &path)
            .await
            .with_context(|| format!("Failed to commit metadata file: {}", path.display()))?;

        debug!("Metadata written for {}", suspend_id);
        Ok(())
    }

    /// Load a sidecar record.
    ///
    /// Missing, unparseable or incomplete records come back as `Ok(None)`; only
    /// an unreadable file is an error.
    pub async fn read_metadata(&self, suspend_id: &str) -> Result<Option<SessionRecord>> {
        let path = self.metadata_path(suspend_id)?;

        let content = match async_fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read metadata file: {}", path.display()));
            }
        };

        let record: SessionRecord = match serde_json::from_slice(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring malformed metadata {}: {}", suspend_id, e);
                return Ok(None);
            }
        };

        if !record.is_well_formed() || record.suspend_id.to_string() != suspend_id {
            warn!("Ignoring incomplete metadata {}", suspend_id);
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Delete a sidecar record. Deleting a missing record succeeds.
    pub async fn delete_metadata(&self, suspend_id: &str) -> Result<()> {
        let path = self.metadata_path(suspend_id)?;
        remove_if_exists(&path).await
    }

    /// Suspend ids of every sidecar on disk. Empty on any scan failure.
    pub async fn list_metadata_keys(&self) -> Vec<String> {
        self.list_keys(env::suspend::METADATA_FILE_EXTENSION).await
    }

    /// Log keys of every log on disk. Empty on any scan failure.
    pub async fn list_log_keys(&self) -> Vec<String> {
        self.list_keys(env::suspend::LOG_FILE_EXTENSION).await
    }

    async fn list_keys(&self, extension: &str) -> Vec<String> {
        let mut keys = Vec::new();

        let mut entries = match async_fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Failed to scan log directory {}: {}",
                    self.data_dir.display(),
                    e
                );
                return keys;
            }
        };

        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
                        && let Some(key) = decode_key(stem)
                    {
                        keys.push(key);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Log directory scan interrupted: {}", e);
                    return Vec::new();
                }
            }
        }

        keys.sort();
        keys
    }

    fn log_path(&self, key: &str) -> Result<PathBuf> {
        Ok(env::log_file_path(&self.data_dir, &encode_key(key)?))
    }

    fn metadata_path(&self, suspend_id: &str) -> Result<PathBuf> {
        Ok(env::metadata_file_path(&self.data_dir, &encode_key(suspend_id)?))
    }
}

/// Map a key to a file stem. Separators and NUL are escaped; `.` and `..`
/// only ever appear followed by an extension, so they stay plain names.
fn encode_key(key: &str) -> Result<Cow<'_, str>, LogStoreError> {
    if key.is_empty() {
        return Err(LogStoreError::InvalidKey(key.to_string()));
    }
    Ok(urlencoding::encode(key))
}

fn decode_key(stem: &str) -> Option<String> {
    match urlencoding::decode(stem) {
        Ok(key) if !key.is_empty() && urlencoding::encode(&key) == stem => Some(key.into_owned()),
        _ => None,
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match async_fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_encoding() {
        assert_eq!(encode_key("abc-123_x").unwrap(), "abc-123_x");
        assert_eq!(encode_key("tenant/term-1").unwrap(), "tenant%2Fterm-1");
        assert_eq!(encode_key("a\\b\0").unwrap(), "a%5Cb%00");
        assert!(encode_key("").is_err());
        assert!(!LogStore::is_valid_key(""));
        assert!(LogStore::is_valid_key(".."));
    }

    #[test]
    fn test_key_decoding() {
        assert_eq!(decode_key("tenant%2Fterm-1").as_deref(), Some("tenant/term-1"));
        assert_eq!(decode_key("..").as_deref(), Some(".."));
        // Not produced by encode_key
        assert!(decode_key("a%2fb").is_none());
        assert!(decode_key("%FF").is_none());
    }
}
