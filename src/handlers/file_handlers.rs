//! HTTP handlers for file operations.
//!
//! Thin callers over the service layer: extraction and response shaping
//! happen here, everything else is delegated to `FileStore`,
//! `TransferService`, and `TempFileManager`.

use crate::{
    errors::AppError,
    routes::routes::AppState,
    services::file_store::FindAllParams,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query params accepted by `GET /files`.
#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub prefix: Option<String>,
    #[serde(default)]
    pub include_temp: bool,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Query params accepted by `PUT /files/{*path}`.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub created_by: Option<Uuid>,
}

/// Optional body for `PATCH /meta/{*path}`.
#[derive(Debug, Deserialize)]
pub struct TouchReq {
    pub modified_on: Option<DateTime<Utc>>,
}

/// Body for `POST /ops/copy` and `POST /ops/move`.
#[derive(Debug, Deserialize)]
pub struct TransferReq {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub overwrite: bool,
}

/// Query params accepted by `PUT /tmp/files/{filename}`.
#[derive(Debug, Deserialize)]
pub struct TempUploadQuery {
    pub extension: Option<String>,
}

/// Query params accepted by `POST /tmp/cleanup`.
#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    pub expiration_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: usize,
}

/// PUT `/files/{*path}` — create a file from the raw request body.
pub async fn upload_file(
    State(state): State<AppState>,
    Path(filepath): Path<String>,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .files
        .create(&filepath, &body, None, q.created_by)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET `/files/{*path}` — download the full payload.
pub async fn get_file(
    State(state): State<AppState>,
    Path(filepath): Path<String>,
) -> Result<Response, AppError> {
    let (_, bytes) = state.files.read_payload(&filepath).await?;

    let mut response = Response::new(Body::from(bytes));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}

/// DELETE `/files/{*path}` — delete a file. Idempotent.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(filepath): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.files.delete(&filepath).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/files` — list records, supports ?prefix=&include_temp=&skip=&limit=
pub async fn list_files(
    State(state): State<AppState>,
    Query(q): Query<ListFilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let records = state
        .files
        .find_all(FindAllParams {
            path_prefix: q.prefix,
            include_temp: q.include_temp,
            skip: q.skip,
            limit: q.limit,
        })
        .await?;
    Ok(Json(records))
}

/// GET `/meta/{*path}` — metadata record only.
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(filepath): Path<String>,
) -> Result<Response, AppError> {
    match state.files.find(&filepath).await? {
        Some(record) => Ok(Json(record).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// PATCH `/meta/{*path}` — update the modification date (defaults to now).
pub async fn touch_file(
    State(state): State<AppState>,
    Path(filepath): Path<String>,
    body: Option<Json<TouchReq>>,
) -> Result<impl IntoResponse, AppError> {
    let modified_on = body
        .and_then(|Json(req)| req.modified_on)
        .unwrap_or_else(Utc::now);
    let record = state
        .files
        .update_modification_date(&filepath, modified_on)
        .await?;
    Ok(Json(record))
}

/// POST `/ops/copy` — copy source to destination.
pub async fn copy_file(
    State(state): State<AppState>,
    Json(req): Json<TransferReq>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .transfers
        .copy(&req.source, &req.destination, req.overwrite)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST `/ops/move` — move source to destination.
pub async fn move_file(
    State(state): State<AppState>,
    Json(req): Json<TransferReq>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .transfers
        .rename(&req.source, &req.destination, req.overwrite)
        .await?;
    Ok(Json(record))
}

/// PUT `/tmp/files/{filename}` — create a temp file from the raw body.
pub async fn upload_temp_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(q): Query<TempUploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .temp
        .create_temp_file(&filename, &body, q.extension.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST `/tmp/cleanup` — delete temp files older than `expiration_secs`.
pub async fn cleanup_temp_files(
    State(state): State<AppState>,
    Query(q): Query<CleanupQuery>,
) -> Result<impl IntoResponse, AppError> {
    if q.expiration_secs < 0 {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "expiration_secs must not be negative",
        ));
    }
    let deleted = state
        .temp
        .cleanup_expired_temp_files(Duration::seconds(q.expiration_secs))
        .await?;
    Ok(Json(CleanupResponse { deleted }))
}
