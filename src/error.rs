// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Error type shared by the disk and file-transfer servers.

use std::path::PathBuf;

use remotefs_wire::WireError;
use thiserror::Error;

/// Errors produced by remotefs components.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or filesystem failure with no more specific context.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A backing image could not be created, opened or mapped.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// Frame decoding failed.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// Configuration was unreadable or inconsistent.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an I/O failure with the path it concerned.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
