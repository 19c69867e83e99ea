//! Lifecycle of files in the reserved `/tmp/` namespace.
//!
//! Temp files are ordinary records whose path happens to live under the
//! temp prefix; only the prefix convention marks them ephemeral. Each
//! temp file gets a random path section so concurrent callers can share
//! a base filename without colliding.

use crate::models::file::FileRecord;
use crate::services::file_store::{FileStore, FileStoreError, FileStoreResult, FindAllParams};
use crate::services::path::{SEPARATOR, TMP_FOLDER, TMP_PREFIX};
use chrono::{Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct TempFileManager {
    store: FileStore,
}

impl TempFileManager {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    /// Create and persist a temp file at
    /// `/tmp/<random-section>/<filename><extension>`.
    ///
    /// The extension, when given, is lowercased and gets a leading dot.
    /// The payload goes through the store's create operation, so the
    /// record is fully backed by a blob object like any other file.
    pub async fn create_temp_file(
        &self,
        filename: &str,
        payload: &[u8],
        extension: Option<&str>,
    ) -> FileStoreResult<FileRecord> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(FileStoreError::InvalidArgument(
                "filename cannot be null or empty".into(),
            ));
        }

        let extension = normalize_extension(extension);
        let section = Uuid::new_v4().simple().to_string();
        let tmp_path = format!(
            "{SEPARATOR}{TMP_FOLDER}{SEPARATOR}{section}{SEPARATOR}{filename}{extension}"
        );

        self.store.create(&tmp_path, payload, None, None).await
    }

    /// Delete temp files older than `expiration`.
    ///
    /// Each expired file is deleted independently; a failure on one is
    /// logged and does not stop the sweep. Returns how many files were
    /// deleted.
    pub async fn cleanup_expired_temp_files(&self, expiration: Duration) -> FileStoreResult<usize> {
        let temp_files = self
            .store
            .find_all(FindAllParams {
                path_prefix: Some(TMP_PREFIX.to_string()),
                include_temp: true,
                ..Default::default()
            })
            .await?;

        let cutoff = Utc::now() - expiration;
        let mut deleted = 0;
        for file in temp_files {
            if file.created_on >= cutoff {
                continue;
            }
            match self.store.delete(&file.path).await {
                Ok(()) => deleted += 1,
                Err(err) => warn!("failed to delete expired temp file {}: {err}", file.path),
            }
        }

        debug!("temp cleanup removed {deleted} expired files");
        Ok(deleted)
    }
}

/// Lowercase the extension and enforce a leading dot. Blank input means
/// no extension at all.
fn normalize_extension(extension: Option<&str>) -> String {
    match extension.map(str::trim) {
        Some(ext) if !ext.is_empty() => {
            let ext = ext.to_lowercase();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            }
        }
        _ => String::new(),
    }
}
