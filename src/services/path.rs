//! Path normalization rules shared by every store operation.
//!
//! All stored paths are lowercase and start with the folder separator.
//! Normalization is pure and idempotent: feeding a canonical path back
//! through `normalize` returns it unchanged.

use crate::services::file_store::{FileStoreError, FileStoreResult};

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Reserved namespace for temporary files. Paths under this prefix are
/// excluded from listings unless explicitly requested.
pub const TMP_PREFIX: &str = "/tmp/";

/// Name of the reserved temp folder, without separators.
pub const TMP_FOLDER: &str = "tmp";

/// Turn a caller-supplied path into its canonical form.
///
/// Trims surrounding whitespace, lowercases, and prepends the separator
/// when absent. Rejects empty or all-whitespace input.
pub fn normalize(path: &str) -> FileStoreResult<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(FileStoreError::InvalidArgument(
            "path cannot be null or empty".into(),
        ));
    }

    let mut canonical = trimmed.to_lowercase();
    if !canonical.starts_with(SEPARATOR) {
        canonical.insert(0, SEPARATOR);
    }
    Ok(canonical)
}

/// Whether a canonical path lives in the reserved temp namespace.
pub fn is_temp(canonical: &str) -> bool {
    canonical.starts_with(TMP_PREFIX)
}
