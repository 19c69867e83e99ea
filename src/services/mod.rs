//! Service layer: the metadata store and the components built on it.

pub mod blob_store;
pub mod file_store;
pub mod path;
pub mod temp_files;
pub mod transfer;
