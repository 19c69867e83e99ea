//! Copy and move orchestration over the metadata store and blob store.
//!
//! Both operations compose several store steps (overwrite delete,
//! payload read, create or path reassignment) inside one transaction,
//! so a failure at any step leaves source and destination untouched.

use crate::models::file::FileRecord;
use crate::services::file_store::{FileStore, FileStoreError, FileStoreResult};
use crate::services::path;
use chrono::Utc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct TransferService {
    store: FileStore,
}

impl TransferService {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    /// Copy the file at `source` to `destination`.
    ///
    /// The copy is a brand-new record with its own id and blob object;
    /// it carries the source's `created_on`/`created_by` but a fresh
    /// modification timestamp. With `overwrite`, an existing
    /// destination is deleted first, inside the same transaction.
    pub async fn copy(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> FileStoreResult<FileRecord> {
        let src_path = path::normalize(source)?;
        let dst_path = path::normalize(destination)?;

        let mut tx = self.store.db.begin().await?;
        let result = self.copy_in(&mut tx, &src_path, &dst_path, overwrite).await;
        match result {
            Ok(record) => {
                tx.commit().await?;
                debug!("copied {src_path} to {dst_path}");
                Ok(record)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback after failed copy to {dst_path}: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Move the file at `source` to `destination`.
    ///
    /// Unlike copy, this reassigns the existing record's path in place:
    /// id and blob reference are unchanged, only the path (and the
    /// modification timestamp) change. With `overwrite`, an existing
    /// destination is deleted first, inside the same transaction.
    pub async fn rename(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> FileStoreResult<FileRecord> {
        let src_path = path::normalize(source)?;
        let dst_path = path::normalize(destination)?;

        let mut tx = self.store.db.begin().await?;
        let result = self.move_in(&mut tx, &src_path, &dst_path, overwrite).await;
        match result {
            Ok(record) => {
                tx.commit().await?;
                debug!("moved {src_path} to {dst_path}");
                Ok(record)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback after failed move to {dst_path}: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    async fn copy_in(
        &self,
        conn: &mut sqlx::SqliteConnection,
        src_path: &str,
        dst_path: &str,
        overwrite: bool,
    ) -> FileStoreResult<FileRecord> {
        let source = FileStore::find_in(conn, src_path)
            .await?
            .ok_or_else(|| FileStoreError::NotFound(src_path.to_string()))?;
        let destination = FileStore::find_in(conn, dst_path).await?;
        if destination.is_some() && !overwrite {
            return Err(FileStoreError::AlreadyExists(dst_path.to_string()));
        }

        // Read before the overwrite delete so copying a file onto its
        // own path cannot release the payload it is about to duplicate.
        let bytes = self
            .store
            .blobs
            .read_all(conn, source.object_ref)
            .await?;

        if destination.is_some() {
            self.store.delete_in(conn, dst_path).await?;
        }

        self.store
            .create_in(
                conn,
                dst_path,
                &bytes,
                Some(source.created_on),
                source.created_by,
            )
            .await
    }

    async fn move_in(
        &self,
        conn: &mut sqlx::SqliteConnection,
        src_path: &str,
        dst_path: &str,
        overwrite: bool,
    ) -> FileStoreResult<FileRecord> {
        let source = FileStore::find_in(conn, src_path)
            .await?
            .ok_or_else(|| FileStoreError::NotFound(src_path.to_string()))?;
        let destination = FileStore::find_in(conn, dst_path).await?;
        if destination.is_some() && !overwrite {
            return Err(FileStoreError::AlreadyExists(dst_path.to_string()));
        }

        if let Some(dst) = destination {
            if dst.id == source.id {
                // Same record under both spellings; nothing to do.
                return Ok(source);
            }
            self.store.delete_in(conn, dst_path).await?;
        }

        let record = sqlx::query_as::<_, FileRecord>(
            "UPDATE files SET path = ?, modified_on = ? WHERE id = ? \
             RETURNING id, object_ref, path, created_on, modified_on, created_by, modified_by",
        )
        .bind(dst_path)
        .bind(Utc::now())
        .bind(source.id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::test_store;

    async fn service() -> (FileStore, TransferService) {
        let store = test_store().await;
        let transfers = TransferService::new(store.clone());
        (store, transfers)
    }

    #[tokio::test]
    async fn copy_creates_independent_record_with_same_payload() {
        let (store, transfers) = service().await;
        let src = store
            .create("/docs/readme.txt", b"hello", None, None)
            .await
            .unwrap();

        let copy = transfers
            .copy("/docs/readme.txt", "/docs/readme2.txt", false)
            .await
            .unwrap();

        assert_ne!(copy.id, src.id);
        assert_ne!(copy.object_ref, src.object_ref);
        assert_eq!(copy.path, "/docs/readme2.txt");
        assert_eq!(copy.created_on, src.created_on);

        let (_, bytes) = store.read_payload("/docs/readme2.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn copied_payload_survives_deleting_the_source() {
        let (store, transfers) = service().await;
        store.create("/src", b"data", None, None).await.unwrap();
        transfers.copy("/src", "/dst", false).await.unwrap();

        store.delete("/src").await.unwrap();

        let (_, bytes) = store.read_payload("/dst").await.unwrap();
        assert_eq!(bytes, b"data");
    }

    #[tokio::test]
    async fn copy_missing_source_is_not_found() {
        let (_, transfers) = service().await;
        let err = transfers.copy("/ghost", "/dst", false).await.unwrap_err();
        assert!(matches!(err, FileStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn copy_refuses_existing_destination_without_overwrite() {
        let (store, transfers) = service().await;
        store.create("/src", b"a", None, None).await.unwrap();
        store.create("/dst", b"b", None, None).await.unwrap();

        let err = transfers.copy("/src", "/dst", false).await.unwrap_err();
        assert!(matches!(err, FileStoreError::AlreadyExists(_)));

        let (_, bytes) = store.read_payload("/dst").await.unwrap();
        assert_eq!(bytes, b"b");
    }

    #[tokio::test]
    async fn copy_with_overwrite_replaces_destination() {
        let (store, transfers) = service().await;
        store.create("/src", b"new", None, None).await.unwrap();
        let old_dst = store.create("/dst", b"old", None, None).await.unwrap();

        let copy = transfers.copy("/src", "/dst", true).await.unwrap();
        assert_ne!(copy.id, old_dst.id);

        let (_, bytes) = store.read_payload("/dst").await.unwrap();
        assert_eq!(bytes, b"new");

        // The overwritten destination's blob must be gone.
        let mut conn = store.db.acquire().await.unwrap();
        assert!(
            store
                .blobs
                .read_all(&mut conn, old_dst.object_ref)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn move_preserves_id_and_object_ref() {
        let (store, transfers) = service().await;
        let src = store
            .create("/docs/readme2.txt", b"hello", None, None)
            .await
            .unwrap();

        let moved = transfers
            .rename("/docs/readme2.txt", "/archive/readme2.txt", false)
            .await
            .unwrap();

        assert_eq!(moved.id, src.id);
        assert_eq!(moved.object_ref, src.object_ref);
        assert_eq!(moved.path, "/archive/readme2.txt");
        assert!(store.find("/docs/readme2.txt").await.unwrap().is_none());

        let (_, bytes) = store.read_payload("/archive/readme2.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn move_refuses_existing_destination_without_overwrite() {
        let (store, transfers) = service().await;
        store.create("/src", b"a", None, None).await.unwrap();
        store.create("/dst", b"b", None, None).await.unwrap();

        let err = transfers.rename("/src", "/dst", false).await.unwrap_err();
        assert!(matches!(err, FileStoreError::AlreadyExists(_)));
        assert!(store.find("/src").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn move_with_overwrite_deletes_old_destination() {
        let (store, transfers) = service().await;
        let src = store.create("/src", b"keep", None, None).await.unwrap();
        let old_dst = store.create("/dst", b"drop", None, None).await.unwrap();

        let moved = transfers.rename("/src", "/dst", true).await.unwrap();
        assert_eq!(moved.id, src.id);

        let (_, bytes) = store.read_payload("/dst").await.unwrap();
        assert_eq!(bytes, b"keep");

        let mut conn = store.db.acquire().await.unwrap();
        assert!(
            store
                .blobs
                .read_all(&mut conn, old_dst.object_ref)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn move_missing_source_is_not_found() {
        let (_, transfers) = service().await;
        let err = transfers.rename("/ghost", "/dst", false).await.unwrap_err();
        assert!(matches!(err, FileStoreError::NotFound(_)));
    }
}
