// CLASSIFICATION: COMMUNITY
// Filename: session.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Per-connection disk protocol engine.
//!
//! A session starts without a client identifier and only accepts sector
//! traffic once a handshake has bound it to a drive set.
//!
//! Successful sector writes are fire-and-forget: the engine sends **no
//! response frame** for them. Only a write that cannot be dispatched (no
//! handshake yet, or a bad drive index) answers with a single error byte.
//! Clients stream writes back-to-back and would desynchronise if an
//! acknowledgement were added.

use std::io::{self, BufReader, Read, Write};
use std::sync::Arc;

use log::{debug, error, info, warn};
use remotefs_wire::disk::CMD_HANDSHAKE;
use remotefs_wire::{DiskRequest, DiskResponse, SectorAddr, WireError, MAX_DRIVES};

use crate::disk::registry::{ClientRegistry, DriveSet};
use crate::disk::store::SectorStore;
use crate::error::Result;

enum State {
    AwaitingId,
    Ready { client_id: String, drives: DriveSet },
}

/// Disk protocol session over one byte stream.
pub struct DiskSession<S: Read + Write> {
    stream: BufReader<S>,
    registry: Arc<ClientRegistry>,
    peer: String,
    state: State,
}

impl<S: Read + Write> DiskSession<S> {
    /// Wrap `stream`; `peer` is only used in log lines.
    pub fn new(stream: S, registry: Arc<ClientRegistry>, peer: impl Into<String>) -> Self {
        Self {
            stream: BufReader::new(stream),
            registry,
            peer: peer.into(),
            state: State::AwaitingId,
        }
    }

    /// Identifier bound by the last successful handshake.
    pub fn client_id(&self) -> Option<&str> {
        match &self.state {
            State::AwaitingId => None,
            State::Ready { client_id, .. } => Some(client_id),
        }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    /// Serve requests until the peer goes away.
    ///
    /// Disconnects, truncated frames and idle timeouts end the session with
    /// `Ok`; other transport failures are returned.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let request = match DiskRequest::read_from(&mut self.stream) {
                Ok(request) => request,
                Err(WireError::Truncated(CMD_HANDSHAKE)) => {
                    warn!("[{}] handshake client id read failed", self.peer);
                    let _ = self.send(&DiskResponse::Error);
                    return Ok(());
                }
                Err(e) if e.is_disconnect() => {
                    debug!("[{}] peer closed: {e}", self.peer);
                    return Ok(());
                }
                Err(WireError::Io(e)) if is_idle_timeout(&e) => {
                    info!("[{}] idle timeout, dropping connection", self.peer);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(response) = self.dispatch(request) {
                self.send(&response)?;
            }
        }
    }

    fn send(&mut self, response: &DiskResponse) -> io::Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(&response.encode())?;
        stream.flush()
    }

    /// Apply one request and return the frame to send, if any.
    pub fn dispatch(&mut self, request: DiskRequest) -> Option<DiskResponse> {
        match request {
            DiskRequest::Handshake { id } => Some(self.handshake(&id)),
            DiskRequest::ReadSector(addr) => {
                let Some(store) = self.store_for(addr, "READ") else {
                    return Some(DiskResponse::Error);
                };
                let data = store.read(usize::from(addr.track), usize::from(addr.sector));
                debug!(
                    "[{}] READ:  drive={}, track={:02}, sector={:02}, success={}",
                    self.peer,
                    addr.drive,
                    addr.track,
                    addr.sector,
                    data.is_some()
                );
                Some(match data {
                    Some(data) => DiskResponse::Sector(Box::new(data)),
                    None => DiskResponse::Error,
                })
            }
            DiskRequest::WriteSector(addr, data) => {
                let Some(store) = self.store_for(addr, "WRITE") else {
                    return Some(DiskResponse::Error);
                };
                let ok = store.write(usize::from(addr.track), usize::from(addr.sector), &data[..]);
                debug!(
                    "[{}] WRITE: drive={}, track={:02}, sector={:02}, success={}",
                    self.peer, addr.drive, addr.track, addr.sector, ok
                );
                None
            }
            DiskRequest::Unknown(code) => {
                warn!("[{}] unknown command: {code:#04X}", self.peer);
                Some(DiskResponse::Error)
            }
        }
    }

    fn handshake(&mut self, id: &[u8]) -> DiskResponse {
        if id.is_empty() {
            warn!("[{}] handshake missing client id", self.peer);
            return DiskResponse::Error;
        }
        let client_id = decode_client_id(id);
        if client_id.is_empty() {
            warn!("[{}] handshake empty client id", self.peer);
            return DiskResponse::Error;
        }
        match self.registry.get_or_create_drives(&client_id) {
            Ok(drives) => {
                info!("handshake from {} (id={client_id})", self.peer);
                self.state = State::Ready { client_id, drives };
                DiskResponse::Ok
            }
            Err(e) => {
                error!("[{}] provisioning {client_id} failed: {e}", self.peer);
                DiskResponse::Error
            }
        }
    }

    /// Resolve the store for `addr`, or `None` with `Error` semantics.
    fn store_for(&self, addr: SectorAddr, op: &str) -> Option<Arc<SectorStore>> {
        let State::Ready { drives, .. } = &self.state else {
            warn!("[{}] {op} before handshake", self.peer);
            return None;
        };
        let drive = usize::from(addr.drive);
        if drive >= MAX_DRIVES {
            warn!("[{}] invalid drive: {drive}", self.peer);
            return None;
        }
        Some(Arc::clone(&drives[drive]))
    }
}

/// Decode an identifier as ASCII, one replacement character per non-ASCII
/// byte, then trim surrounding whitespace.
fn decode_client_id(id: &[u8]) -> String {
    id.iter()
        .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_idle_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
