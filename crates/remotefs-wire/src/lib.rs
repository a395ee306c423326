// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Wire types and codec primitives for the remotefs disk and file-transfer
//! protocols spoken by Altair 8800 emulator clients.
//!
//! Both protocols are a single command byte followed by a fixed or
//! self-delimiting payload. There is no length prefix and no correlation id,
//! so a peer must never pipeline a second request before the first answer.

use std::io::{self, Read};

pub mod disk;
pub mod transfer;

pub use disk::{DiskRequest, DiskResponse, SectorAddr};
pub use transfer::{ChunkResponse, TransferRequest};

/// Bytes per sector of an 8" floppy image.
pub const SECTOR_SIZE: usize = 137;
/// Sectors on every track.
pub const SECTORS_PER_TRACK: usize = 32;
/// Tracks on a disk.
pub const MAX_TRACKS: usize = 77;
/// Bytes per track.
pub const TRACK_SIZE: usize = SECTORS_PER_TRACK * SECTOR_SIZE;
/// Bytes per disk image.
pub const DISK_SIZE: usize = MAX_TRACKS * TRACK_SIZE;
/// Drive slots served to every client.
pub const MAX_DRIVES: usize = 4;
/// Template image names, indexed by drive slot.
pub const DISK_NAMES: [&str; MAX_DRIVES] = [
    "cpm63k.dsk",
    "bdsc-v1.60.dsk",
    "escape-posix.dsk",
    "blank.dsk",
];

/// Largest payload carried by one file-transfer chunk.
pub const CHUNK_SIZE: usize = 256;
/// Longest null-terminated path accepted from a client.
pub const MAX_PATH_LEN: usize = 256;

/// Response status byte shared by both protocols.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Success; for chunks, more data follows at this path.
    Ok = 0x00,
    /// Final chunk of a file.
    Eof = 0x01,
    /// Request failed; no payload follows.
    Error = 0xFF,
}

impl TryFrom<u8> for Status {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0x00 => Ok(Status::Ok),
            0x01 => Ok(Status::Eof),
            0xFF => Ok(Status::Error),
            other => Err(WireError::UnknownStatus(other)),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status as u8
    }
}

/// Errors produced while decoding remotefs frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The peer closed the connection cleanly between frames.
    #[error("connection closed")]
    Closed,
    /// The peer closed the connection part way through a frame.
    #[error("truncated frame for command {0:#04x}")]
    Truncated(u8),
    /// A response carried a status byte outside the protocol.
    #[error("unknown status byte {0:#04x}")]
    UnknownStatus(u8),
    /// A sector payload was not exactly [`SECTOR_SIZE`] bytes.
    #[error("invalid sector payload length {0}")]
    InvalidLength(usize),
    /// Underlying transport failure other than end-of-stream.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    /// True when the failure means the peer is gone rather than misbehaving.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, WireError::Closed | WireError::Truncated(_))
    }
}

/// Read the command byte that opens every frame.
///
/// Returns [`WireError::Closed`] on a clean end-of-stream.
pub fn read_command<R: Read>(reader: &mut R) -> Result<u8, WireError> {
    let mut byte = [0u8; 1];
    match reader.read_exact(&mut byte) {
        Ok(()) => Ok(byte[0]),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(WireError::Closed),
        Err(err) => Err(WireError::Io(err)),
    }
}

/// Fill `buf` completely or report the frame for `command` as truncated.
pub(crate) fn read_payload<R: Read>(
    reader: &mut R,
    command: u8,
    buf: &mut [u8],
) -> Result<(), WireError> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => WireError::Truncated(command),
        _ => WireError::Io(err),
    })
}

/// Byte offset of `(track, sector)` inside a disk image, if it is in range.
#[must_use]
pub fn sector_offset(track: usize, sector: usize) -> Option<usize> {
    if track >= MAX_TRACKS || sector >= SECTORS_PER_TRACK {
        return None;
    }
    Some(track * TRACK_SIZE + sector * SECTOR_SIZE)
}
