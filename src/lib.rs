// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Remote disk emulation and chunked file transfer for the Altair 8800
//! emulator.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Command line front end
pub mod cli;
/// JSON-backed server configuration
pub mod config;
/// Per-client disk images and the sector protocol server
pub mod disk;
/// Crate error type
pub mod error;
/// Shared TCP accept loop
pub mod net;
/// Fixed-size connection worker pool
pub mod pool;
/// Offset-addressed file transfer server
pub mod transfer;

pub use error::{Error, Result};
pub use remotefs_wire as wire;
