// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Offset-addressed chunked file transfer.

pub mod cache;
pub mod path;
pub mod server;
pub mod service;
pub mod session;

pub use cache::{Clock, FileHandleCache, SystemClock};
pub use server::TransferServer;
pub use service::{FileService, LookupError, SharedFile};
pub use session::TransferSession;
