//! Defines routes for all file-store operations.
//!
//! ## Structure
//! - **File endpoints**
//!   - `GET    /files` — list records (supports prefix, include_temp, skip, limit)
//!   - `PUT    /files/{*path}` — create a file
//!   - `GET    /files/{*path}` — download payload
//!   - `DELETE /files/{*path}` — delete a file
//!
//! - **Metadata endpoints**
//!   - `GET    /meta/{*path}` — record only
//!   - `PATCH  /meta/{*path}` — update modification date
//!
//! - **Orchestrated operations**
//!   - `POST   /ops/copy`, `POST /ops/move`
//!
//! - **Temp namespace**
//!   - `PUT    /tmp/files/{filename}` — create a temp file
//!   - `POST   /tmp/cleanup` — expire old temp files
//!
//! The wildcard `*path` allows nested paths like `docs/2025/readme.txt`.

use crate::{
    handlers::{
        file_handlers::{
            cleanup_temp_files, copy_file, delete_file, get_file, get_metadata, list_files,
            move_file, touch_file, upload_file, upload_temp_file,
        },
        health_handlers::{healthz, readyz},
    },
    services::{
        file_store::FileStore, temp_files::TempFileManager, transfer::TransferService,
    },
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Shared state handed to every handler: the metadata store plus the
/// two components layered on it.
#[derive(Clone)]
pub struct AppState {
    pub files: FileStore,
    pub transfers: TransferService,
    pub temp: TempFileManager,
}

impl AppState {
    pub fn new(files: FileStore) -> Self {
        Self {
            transfers: TransferService::new(files.clone()),
            temp: TempFileManager::new(files.clone()),
            files,
        }
    }
}

/// Build and return the router for all file-store routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // listing
        .route("/files", get(list_files))
        // file-level routes
        .route(
            "/files/{*path}",
            put(upload_file).get(get_file).delete(delete_file),
        )
        // metadata routes
        .route("/meta/{*path}", get(get_metadata).patch(touch_file))
        // copy/move orchestration
        .route("/ops/copy", post(copy_file))
        .route("/ops/move", post(move_file))
        // temp namespace
        .route("/tmp/files/{filename}", put(upload_temp_file))
        .route("/tmp/cleanup", post(cleanup_temp_files))
}
