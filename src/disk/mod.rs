// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Sector-addressed disk emulation: stores, client registry, protocol
//! sessions and the TCP server.

pub mod registry;
pub mod server;
pub mod session;
pub mod store;

pub use registry::{sanitize_client_id, ClientRegistry, DriveSet};
pub use server::DiskServer;
pub use session::DiskSession;
pub use store::{SectorStore, FLUSH_INTERVAL};
