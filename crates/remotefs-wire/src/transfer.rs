// Author: Lukas Bower

//! Chunked file-transfer protocol.

use std::io::Read;

use crate::{read_command, read_payload, Status, WireError, CHUNK_SIZE, MAX_PATH_LEN};

/// Legacy: open a file for sequential reads on this connection.
pub const CMD_SET_FILENAME: u8 = 0x01;
/// Fetch the chunk at `offset(4, LE)` of a null-terminated path.
pub const CMD_GET_CHUNK: u8 = 0x02;
/// Drop any cached state for a null-terminated path.
pub const CMD_CLOSE: u8 = 0x03;

/// A decoded file-transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    /// Legacy single-stream open.
    SetFilename {
        /// Raw path as sent by the client.
        path: String,
    },
    /// Stateless chunk fetch.
    GetChunk {
        /// Absolute byte offset into the file.
        offset: u32,
        /// Raw path as sent by the client; empty selects the legacy stream.
        path: String,
    },
    /// Release state held for the path.
    Close {
        /// Raw path as sent by the client.
        path: String,
    },
    /// Any command byte outside the protocol. Carries no payload.
    Unknown(u8),
}

impl TransferRequest {
    /// Decode the next request from `reader`.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let command = read_command(reader)?;
        match command {
            CMD_SET_FILENAME => Ok(TransferRequest::SetFilename {
                path: read_cstring(reader, command)?,
            }),
            CMD_GET_CHUNK => {
                let mut offset = [0u8; 4];
                read_payload(reader, command, &mut offset)?;
                Ok(TransferRequest::GetChunk {
                    offset: u32::from_le_bytes(offset),
                    path: read_cstring(reader, command)?,
                })
            }
            CMD_CLOSE => Ok(TransferRequest::Close {
                path: read_cstring(reader, command)?,
            }),
            other => Ok(TransferRequest::Unknown(other)),
        }
    }

    /// Encode the request as a client would send it.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            TransferRequest::SetFilename { path } => {
                out.push(CMD_SET_FILENAME);
                put_cstring(&mut out, path);
            }
            TransferRequest::GetChunk { offset, path } => {
                out.push(CMD_GET_CHUNK);
                out.extend_from_slice(&offset.to_le_bytes());
                put_cstring(&mut out, path);
            }
            TransferRequest::Close { path } => {
                out.push(CMD_CLOSE);
                put_cstring(&mut out, path);
            }
            TransferRequest::Unknown(code) => out.push(*code),
        }
        out
    }
}

/// Answer to a get-chunk request: `status(1) count(1) data(count)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResponse {
    status: Status,
    data: Vec<u8>,
}

impl ChunkResponse {
    /// `FF 00` with no payload.
    #[must_use]
    pub fn error() -> Self {
        Self {
            status: Status::Error,
            data: Vec::new(),
        }
    }

    /// A chunk of 1..=256 bytes; `last` marks the final chunk of the file.
    ///
    /// An empty `data` is never a valid chunk and becomes an error response.
    #[must_use]
    pub fn chunk(mut data: Vec<u8>, last: bool) -> Self {
        if data.is_empty() {
            return Self::error();
        }
        data.truncate(CHUNK_SIZE);
        let status = if last { Status::Eof } else { Status::Ok };
        Self { status, data }
    }

    /// Status byte of the response.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Payload bytes; empty for errors.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encode the response for the wire.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.data.len());
        out.push(self.status.into());
        out.push(encode_count(self.data.len()));
        out.extend_from_slice(&self.data);
        out
    }

    /// Client side: read one chunk response.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let mut header = [0u8; 2];
        read_payload(reader, CMD_GET_CHUNK, &mut header)?;
        let status = Status::try_from(header[0])?;
        if status == Status::Error {
            return Ok(Self::error());
        }
        let mut data = vec![0u8; decode_count(header[1])];
        read_payload(reader, CMD_GET_CHUNK, &mut data)?;
        Ok(Self { status, data })
    }
}

/// Encode a chunk length into its count byte; 256 travels as 0.
#[must_use]
pub fn encode_count(len: usize) -> u8 {
    if len >= CHUNK_SIZE {
        0
    } else {
        len as u8
    }
}

/// Decode a count byte; 0 means a full 256-byte chunk.
#[must_use]
pub fn decode_count(count: u8) -> usize {
    if count == 0 {
        CHUNK_SIZE
    } else {
        usize::from(count)
    }
}

/// Read a null-terminated string, keeping at most [`MAX_PATH_LEN`] bytes.
///
/// Bytes past the limit are consumed up to the terminator so the next frame
/// starts where the client believes it does.
fn read_cstring<R: Read>(reader: &mut R, command: u8) -> Result<String, WireError> {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        read_payload(reader, command, &mut byte)?;
        if byte[0] == 0 {
            break;
        }
        if raw.len() < MAX_PATH_LEN {
            raw.push(byte[0]);
        }
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn put_cstring(out: &mut Vec<u8>, value: &str) {
    out.extend(value.bytes().filter(|b| *b != 0));
    out.push(0);
}
