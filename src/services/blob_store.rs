//! Blob object storage collaborator.
//!
//! The metadata store treats payload storage as an opaque facility with
//! four operations: allocate a handle, write a whole buffer, read it
//! back, and release the handle. Every operation takes the caller's
//! connection so that blob work and metadata work commit or roll back
//! as one unit when invoked inside a transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::fmt;
use uuid::Uuid;

/// Opaque handle identifying a live blob object.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, sqlx::Type)]
#[sqlx(transparent)]
pub struct ObjectRef(Uuid);

impl ObjectRef {
    /// Mint a handle unique among currently-live objects.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whole-buffer blob storage.
///
/// Implementations must honor the transactional scope of the connection
/// they are handed: a rollback on the caller's transaction must undo
/// any allocate/write/release performed through it.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Allocate a fresh, empty blob object and return its handle.
    async fn allocate(&self, conn: &mut SqliteConnection) -> Result<ObjectRef, sqlx::Error>;

    /// Replace the object's payload with `bytes`.
    async fn write_all(
        &self,
        conn: &mut SqliteConnection,
        object_ref: ObjectRef,
        bytes: &[u8],
    ) -> Result<(), sqlx::Error>;

    /// Read the full payload. Fails when the handle is not live.
    async fn read_all(
        &self,
        conn: &mut SqliteConnection,
        object_ref: ObjectRef,
    ) -> Result<Vec<u8>, sqlx::Error>;

    /// Destroy the object. Fails when the handle is not live.
    async fn release(
        &self,
        conn: &mut SqliteConnection,
        object_ref: ObjectRef,
    ) -> Result<(), sqlx::Error>;
}

/// Blob storage in the `blob_objects` table of the metadata database.
///
/// Keeping payloads in the same database is what lets blob operations
/// share the metadata transaction without any extra coordination.
#[derive(Clone, Debug, Default)]
pub struct SqliteBlobStore;

impl SqliteBlobStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn allocate(&self, conn: &mut SqliteConnection) -> Result<ObjectRef, sqlx::Error> {
        let object_ref = ObjectRef::new();
        sqlx::query("INSERT INTO blob_objects (object_ref, payload) VALUES (?, ?)")
            .bind(object_ref)
            .bind(Vec::<u8>::new())
            .execute(&mut *conn)
            .await?;
        Ok(object_ref)
    }

    async fn write_all(
        &self,
        conn: &mut SqliteConnection,
        object_ref: ObjectRef,
        bytes: &[u8],
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE blob_objects SET payload = ? WHERE object_ref = ?")
            .bind(bytes)
            .bind(object_ref)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    async fn read_all(
        &self,
        conn: &mut SqliteConnection,
        object_ref: ObjectRef,
    ) -> Result<Vec<u8>, sqlx::Error> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT payload FROM blob_objects WHERE object_ref = ?")
            .bind(object_ref)
            .fetch_one(&mut *conn)
            .await
    }

    async fn release(
        &self,
        conn: &mut SqliteConnection,
        object_ref: ObjectRef,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM blob_objects WHERE object_ref = ?")
            .bind(object_ref)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}
