//! Postgres-shaped database backend used by site backups.

pub mod backend;
pub mod common;
pub mod wrapper;

pub use backend::{DatabaseBackend, Postgres};
pub use common::PostgresConfig;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Dump error: {0}")]
    DumpError(String),

    #[error("Restore error: {0}")]
    RestoreError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
