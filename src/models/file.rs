//! Represents a file stored under a canonical path.

use crate::services::blob_store::ObjectRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single file known to the store.
///
/// The record holds metadata and a reference to the blob object carrying
/// the payload; it never holds the payload bytes themselves. The `path`
/// is always canonical (lowercase, leading separator) and unique across
/// all live records.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct FileRecord {
    /// Unique identifier, assigned at creation and never reused.
    pub id: Uuid,

    /// Handle into the blob store for this file's payload. Immutable for
    /// the lifetime of the record; a move never changes it.
    pub object_ref: ObjectRef,

    /// Canonical path key (lowercase, starts with `/`).
    pub path: String,

    /// When the file was created. Set once; callers may supply it.
    pub created_on: DateTime<Utc>,

    /// When content or location last changed.
    pub modified_on: DateTime<Utc>,

    /// Principal that created the file, if known.
    pub created_by: Option<Uuid>,

    /// Principal that last modified the file, if known.
    pub modified_by: Option<Uuid>,
}
