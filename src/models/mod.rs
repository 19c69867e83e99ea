//! Core data model for the path-addressed file store.
//!
//! A single entity, the file record, maps a canonical path to its
//! metadata and to the blob object holding its payload. It maps to the
//! `files` table via `sqlx::FromRow` and serializes as JSON via `serde`.

pub mod file;
