//! FileStore — the path-addressed metadata store.
//!
//! Maps canonical paths to file records backed by blob objects. The
//! `files` table is the single source of truth for metadata; payloads
//! live behind the `BlobStore` collaborator. Operations that touch both
//! (create, delete) run inside one transaction so that a metadata row
//! and its backing object always live and die together.

use crate::models::file::FileRecord;
use crate::services::blob_store::BlobStore;
use crate::services::path;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Schema for the `files` and `blob_objects` tables, embedded so tests
/// and the `--migrate` startup mode share one definition.
pub const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

const SELECT_COLUMNS: &str =
    "id, object_ref, path, created_on, modified_on, created_by, modified_by";

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("file `{0}` does not exist")]
    NotFound(String),
    #[error("file `{0}` already exists")]
    AlreadyExists(String),
    #[error("transaction failed: {0}")]
    Transaction(#[from] sqlx::Error),
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;

/// Filters and paging for [`FileStore::find_all`].
///
/// `path_prefix` restricts results to paths starting with the
/// normalized prefix. `skip`/`limit` apply after filtering; row order
/// is whatever the storage layer returns.
#[derive(Clone, Debug, Default)]
pub struct FindAllParams {
    pub path_prefix: Option<String>,
    pub include_temp: bool,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// FileStore provides the five core operation groups:
/// - find / find_all (lookups over canonical paths)
/// - create (allocate blob + write payload + insert row, atomically)
/// - update_modification_date
/// - delete (release blob + remove row, atomically)
/// - read_payload (metadata plus full payload bytes)
///
/// Both collaborators are injected at construction: the SQLite pool is
/// the transaction/connection provider, the blob store holds payloads.
#[derive(Clone)]
pub struct FileStore {
    /// Shared connection pool; every atomic unit of work begins here.
    pub db: Arc<SqlitePool>,

    /// Payload storage. Invoked on the same connection as metadata
    /// statements whenever both are part of one unit of work.
    pub blobs: Arc<dyn BlobStore>,
}

impl FileStore {
    pub fn new(db: Arc<SqlitePool>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Exact-match lookup by canonical path. A miss is `None`, not an
    /// error.
    pub async fn find(&self, filepath: &str) -> FileStoreResult<Option<FileRecord>> {
        let canonical = path::normalize(filepath)?;
        let mut conn = self.db.acquire().await?;
        Self::find_in(&mut conn, &canonical).await
    }

    /// List records matching the given filters.
    ///
    /// The prefix filter is a true starts-with match on the canonical
    /// path. Temp files (under `/tmp/`) are excluded unless
    /// `include_temp` is set.
    pub async fn find_all(&self, params: FindAllParams) -> FileStoreResult<Vec<FileRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SELECT_COLUMNS} FROM files WHERE 1 = 1"
        ));

        if let Some(prefix) = params.path_prefix.as_deref() {
            let canonical = path::normalize(prefix)?;
            builder.push(" AND path LIKE ");
            builder.push_bind(format!("{}%", canonical));
        }

        if !params.include_temp {
            builder.push(" AND path NOT LIKE ");
            builder.push_bind(format!("{}%", path::TMP_PREFIX));
        }

        if params.limit.is_some() || params.skip.is_some() {
            // SQLite requires LIMIT before OFFSET; -1 means unbounded.
            builder.push(" LIMIT ");
            builder.push_bind(params.limit.unwrap_or(-1));
            if let Some(skip) = params.skip {
                builder.push(" OFFSET ");
                builder.push_bind(skip);
            }
        }

        let records = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(records)
    }

    /// Create a file at `filepath` holding `payload`.
    ///
    /// Fails with `AlreadyExists` when a live record occupies the path,
    /// whether detected by the pre-check or by the storage layer's
    /// uniqueness constraint when two creates race. Blob allocation,
    /// payload write, and row insert commit as one unit; any failure
    /// rolls the whole unit back and propagates.
    pub async fn create(
        &self,
        filepath: &str,
        payload: &[u8],
        created_on: Option<DateTime<Utc>>,
        created_by: Option<Uuid>,
    ) -> FileStoreResult<FileRecord> {
        let canonical = path::normalize(filepath)?;

        let mut tx = self.db.begin().await?;
        match self
            .create_in(&mut tx, &canonical, payload, created_on, created_by)
            .await
        {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback after failed create of {canonical}: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Update only the modification date of the record at `filepath`.
    ///
    /// Fails with `NotFound` when the path is unoccupied. The update is
    /// keyed on the id of the record the lookup resolved.
    pub async fn update_modification_date(
        &self,
        filepath: &str,
        modified_on: DateTime<Utc>,
    ) -> FileStoreResult<FileRecord> {
        let canonical = path::normalize(filepath)?;
        let mut conn = self.db.acquire().await?;

        let existing = Self::find_in(&mut conn, &canonical)
            .await?
            .ok_or_else(|| FileStoreError::NotFound(canonical.clone()))?;

        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "UPDATE files SET modified_on = ? WHERE id = ? RETURNING {SELECT_COLUMNS}"
        ))
        .bind(modified_on)
        .bind(existing.id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(record)
    }

    /// Delete the file at `filepath`, releasing its blob object.
    ///
    /// A miss is a no-op. Row removal and blob release commit as one
    /// unit; any failure rolls back and propagates.
    pub async fn delete(&self, filepath: &str) -> FileStoreResult<()> {
        let canonical = path::normalize(filepath)?;

        let mut tx = self.db.begin().await?;
        match self.delete_in(&mut tx, &canonical).await {
            Ok(deleted) => {
                tx.commit().await?;
                if deleted {
                    debug!("deleted file {canonical}");
                }
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback after failed delete of {canonical}: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Fetch the record at `filepath` together with its full payload.
    pub async fn read_payload(&self, filepath: &str) -> FileStoreResult<(FileRecord, Vec<u8>)> {
        let canonical = path::normalize(filepath)?;
        let mut conn = self.db.acquire().await?;

        let record = Self::find_in(&mut conn, &canonical)
            .await?
            .ok_or_else(|| FileStoreError::NotFound(canonical.clone()))?;
        let bytes = self.blobs.read_all(&mut conn, record.object_ref).await?;
        Ok((record, bytes))
    }

    /// Exact lookup on an already-normalized path, on the caller's
    /// connection so it can run inside a transaction.
    pub(crate) async fn find_in(
        conn: &mut SqliteConnection,
        canonical: &str,
    ) -> FileStoreResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM files WHERE path = ?"
        ))
        .bind(canonical)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(record)
    }

    /// Create inside the caller's transaction. `canonical` must already
    /// be normalized.
    pub(crate) async fn create_in(
        &self,
        conn: &mut SqliteConnection,
        canonical: &str,
        payload: &[u8],
        created_on: Option<DateTime<Utc>>,
        created_by: Option<Uuid>,
    ) -> FileStoreResult<FileRecord> {
        if Self::find_in(conn, canonical).await?.is_some() {
            return Err(FileStoreError::AlreadyExists(canonical.to_string()));
        }

        let object_ref = self.blobs.allocate(conn).await?;
        self.blobs.write_all(conn, object_ref, payload).await?;

        let now = Utc::now();
        let insert = sqlx::query_as::<_, FileRecord>(&format!(
            "INSERT INTO files (id, object_ref, path, created_on, modified_on, created_by, modified_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(object_ref)
        .bind(canonical)
        .bind(created_on.unwrap_or(now))
        .bind(now)
        .bind(created_by)
        .bind(created_by)
        .fetch_one(&mut *conn)
        .await;

        match insert {
            Ok(record) => Ok(record),
            // Lost a concurrent-create race; the constraint is the
            // authoritative uniqueness check.
            Err(err) if is_unique_violation(&err) => {
                Err(FileStoreError::AlreadyExists(canonical.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Delete inside the caller's transaction. Returns whether a record
    /// existed at the path.
    pub(crate) async fn delete_in(
        &self,
        conn: &mut SqliteConnection,
        canonical: &str,
    ) -> FileStoreResult<bool> {
        let Some(record) = Self::find_in(conn, canonical).await? else {
            return Ok(false);
        };

        self.blobs.release(conn, record.object_ref).await?;
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(record.id)
            .execute(&mut *conn)
            .await?;
        Ok(true)
    }
}

/// Apply the embedded schema, statement by statement.
pub async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("running {} migration statements", statements.len());
    for stmt in statements {
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

/// Return true if the SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::test_store;
    use chrono::Duration;

    #[tokio::test]
    async fn create_then_find_round_trips_payload() {
        let store = test_store().await;
        let created = store
            .create("/docs/readme.txt", b"hello", None, None)
            .await
            .unwrap();
        assert_eq!(created.path, "/docs/readme.txt");

        let (found, bytes) = store.read_payload(&created.path).await.unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive_and_separator_tolerant() {
        let store = test_store().await;
        store.create("/A/B", b"x", None, None).await.unwrap();

        let upper = store.find("/A/B").await.unwrap().unwrap();
        let bare = store.find("a/b").await.unwrap().unwrap();
        assert_eq!(upper.id, bare.id);
        assert_eq!(upper.path, "/a/b");
    }

    #[tokio::test]
    async fn duplicate_create_conflicts_and_leaves_first_intact() {
        let store = test_store().await;
        let first = store.create("/dup.txt", b"one", None, None).await.unwrap();

        let err = store.create("/DUP.TXT", b"two", None, None).await.unwrap_err();
        assert!(matches!(err, FileStoreError::AlreadyExists(_)));

        let (survivor, bytes) = store.read_payload("/dup.txt").await.unwrap();
        assert_eq!(survivor.id, first.id);
        assert_eq!(bytes, b"one");
    }

    #[tokio::test]
    async fn failed_create_leaves_no_blob_behind() {
        let store = test_store().await;
        store.create("/f", b"payload", None, None).await.unwrap();
        store.create("/f", b"other", None, None).await.unwrap_err();

        let blob_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blob_objects")
            .fetch_one(&*store.db)
            .await
            .unwrap();
        assert_eq!(blob_count, 1);
    }

    #[tokio::test]
    async fn failed_payload_write_rolls_back_the_whole_create() {
        use crate::services::blob_store::{ObjectRef, SqliteBlobStore};
        use crate::services::testing::test_pool;

        // Allocates normally but refuses every payload write.
        struct FailingWrites;

        #[async_trait::async_trait]
        impl BlobStore for FailingWrites {
            async fn allocate(&self, conn: &mut SqliteConnection) -> Result<ObjectRef, sqlx::Error> {
                SqliteBlobStore::new().allocate(conn).await
            }

            async fn write_all(
                &self,
                _conn: &mut SqliteConnection,
                _object_ref: ObjectRef,
                _bytes: &[u8],
            ) -> Result<(), sqlx::Error> {
                Err(sqlx::Error::Protocol("injected write failure".into()))
            }

            async fn read_all(
                &self,
                conn: &mut SqliteConnection,
                object_ref: ObjectRef,
            ) -> Result<Vec<u8>, sqlx::Error> {
                SqliteBlobStore::new().read_all(conn, object_ref).await
            }

            async fn release(
                &self,
                conn: &mut SqliteConnection,
                object_ref: ObjectRef,
            ) -> Result<(), sqlx::Error> {
                SqliteBlobStore::new().release(conn, object_ref).await
            }
        }

        let store = FileStore::new(Arc::new(test_pool().await), Arc::new(FailingWrites));

        let err = store.create("/doomed", b"x", None, None).await.unwrap_err();
        assert!(matches!(err, FileStoreError::Transaction(_)));

        // Neither the metadata row nor the allocated blob may survive.
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&*store.db)
            .await
            .unwrap();
        let blobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blob_objects")
            .fetch_one(&*store.db)
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(blobs, 0);
    }

    #[tokio::test]
    async fn find_miss_is_none() {
        let store = test_store().await;
        assert!(store.find("/nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_path_is_rejected_before_any_write() {
        let store = test_store().await;
        let err = store.create("   ", b"x", None, None).await.unwrap_err();
        assert!(matches!(err, FileStoreError::InvalidArgument(_)));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&*store.db)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn update_modification_date_touches_only_that_field() {
        let store = test_store().await;
        let created = store.create("/touch.me", b"x", None, None).await.unwrap();

        let later = created.modified_on + Duration::hours(3);
        let updated = store
            .update_modification_date("/touch.me", later)
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.object_ref, created.object_ref);
        assert_eq!(updated.created_on, created.created_on);
        assert_eq!(updated.modified_on, later);
    }

    #[tokio::test]
    async fn update_modification_date_missing_is_not_found() {
        let store = test_store().await;
        let err = store
            .update_modification_date("/ghost", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_record_and_releases_blob() {
        let store = test_store().await;
        let created = store.create("/gone.txt", b"bye", None, None).await.unwrap();

        store.delete("/gone.txt").await.unwrap();
        assert!(store.find("/gone.txt").await.unwrap().is_none());

        let mut conn = store.db.acquire().await.unwrap();
        let read_back = store.blobs.read_all(&mut conn, created.object_ref).await;
        assert!(read_back.is_err());
    }

    #[tokio::test]
    async fn delete_missing_is_a_no_op() {
        let store = test_store().await;
        store.delete("/never/was").await.unwrap();
    }

    #[tokio::test]
    async fn find_all_excludes_temp_files_by_default() {
        let store = test_store().await;
        store.create("/a/b", b"1", None, None).await.unwrap();
        store.create("/tmp/x1/f.txt", b"2", None, None).await.unwrap();

        let visible = store.find_all(FindAllParams::default()).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].path, "/a/b");

        let all = store
            .find_all(FindAllParams {
                include_temp: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn find_all_prefix_matches_path_start() {
        let store = test_store().await;
        store.create("/docs/a.txt", b"1", None, None).await.unwrap();
        store.create("/docs/b.txt", b"2", None, None).await.unwrap();
        store.create("/img/a.png", b"3", None, None).await.unwrap();

        let docs = store
            .find_all(FindAllParams {
                path_prefix: Some("Docs/".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|f| f.path.starts_with("/docs/")));
    }

    #[tokio::test]
    async fn find_all_applies_skip_and_limit_after_filtering() {
        let store = test_store().await;
        for i in 0..5 {
            store
                .create(&format!("/n/{i}"), b"x", None, None)
                .await
                .unwrap();
        }

        let page = store
            .find_all(FindAllParams {
                skip: Some(1),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);

        let tail = store
            .find_all(FindAllParams {
                skip: Some(4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(tail.len(), 1);
    }
}
