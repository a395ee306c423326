// CLASSIFICATION: COMMUNITY
// Filename: session.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Per-connection file-transfer protocol engine.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::sync::Arc;

use log::{debug, info, warn};
use remotefs_wire::{ChunkResponse, Status, TransferRequest, WireError};

use crate::error::Result;
use crate::transfer::cache::{Clock, SystemClock};
use crate::transfer::service::{read_chunk, FileService};

struct Legacy {
    key: String,
    file: File,
}

/// File-transfer session over one byte stream.
///
/// The only per-connection state is the stream opened by the legacy
/// set-filename command; offset-addressed chunk requests go straight to the
/// shared [`FileService`].
pub struct TransferSession<S: Read + Write, C: Clock = SystemClock> {
    stream: BufReader<S>,
    service: Arc<FileService<C>>,
    peer: String,
    legacy: Option<Legacy>,
}

impl<S: Read + Write, C: Clock> TransferSession<S, C> {
    /// Wrap `stream`; `peer` is only used in log lines.
    pub fn new(stream: S, service: Arc<FileService<C>>, peer: impl Into<String>) -> Self {
        Self {
            stream: BufReader::new(stream),
            service,
            peer: peer.into(),
            legacy: None,
        }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    /// Serve requests until the peer goes away or times out.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let request = match TransferRequest::read_from(&mut self.stream) {
                Ok(request) => request,
                Err(e) if e.is_disconnect() => {
                    debug!("[{}] peer closed: {e}", self.peer);
                    break;
                }
                Err(WireError::Io(e))
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    info!("[{}] idle timeout, dropping connection", self.peer);
                    break;
                }
                Err(e) => {
                    self.legacy = None;
                    return Err(e.into());
                }
            };
            let reply = self.dispatch(request);
            let stream = self.stream.get_mut();
            stream.write_all(&reply)?;
            stream.flush()?;
        }
        self.legacy = None;
        Ok(())
    }

    /// Apply one request and return the encoded reply.
    pub fn dispatch(&mut self, request: TransferRequest) -> Vec<u8> {
        match request {
            TransferRequest::SetFilename { path } => vec![u8::from(self.set_filename(&path))],
            TransferRequest::GetChunk { path, .. } if path.is_empty() => {
                self.next_legacy_chunk().encode()
            }
            TransferRequest::GetChunk { offset, path } => {
                self.service.get_chunk(offset, &path).encode()
            }
            TransferRequest::Close { path } => {
                self.service.close(&path);
                if let Some(legacy) = self.legacy.take() {
                    debug!("[{}] closed sequential stream {}", self.peer, legacy.key);
                }
                vec![u8::from(Status::Ok)]
            }
            TransferRequest::Unknown(code) => {
                warn!("[{}] unknown command: {code:#04X}", self.peer);
                vec![u8::from(Status::Error)]
            }
        }
    }

    fn set_filename(&mut self, path: &str) -> Status {
        self.legacy = None;
        match self.service.open_legacy(path) {
            Ok((key, file)) => {
                info!("[{}] sequential transfer of {key}", self.peer);
                self.legacy = Some(Legacy { key, file });
                Status::Ok
            }
            Err(e) => {
                warn!("[{}] set filename {path:?}: {e}", self.peer);
                Status::Error
            }
        }
    }

    fn next_legacy_chunk(&mut self) -> ChunkResponse {
        let Some(legacy) = self.legacy.as_mut() else {
            warn!("[{}] sequential chunk requested with no file open", self.peer);
            return ChunkResponse::error();
        };
        match read_chunk(&mut legacy.file) {
            Ok((data, _)) if data.is_empty() => ChunkResponse::error(),
            Ok((data, more)) => {
                debug!(
                    "[{}] sequential chunk of {}: {} bytes",
                    self.peer,
                    legacy.key,
                    data.len()
                );
                ChunkResponse::chunk(data, !more)
            }
            Err(e) => {
                warn!("[{}] reading {} failed: {e}", self.peer, legacy.key);
                self.legacy = None;
                ChunkResponse::error()
            }
        }
    }
}
