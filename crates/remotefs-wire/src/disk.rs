// Author: Lukas Bower

//! Sector-addressed disk protocol.

use std::io::Read;

use crate::{read_command, read_payload, Status, WireError, SECTOR_SIZE};

/// Read one sector: `drive(1) track(1) sector(1)`.
pub const CMD_READ_SECTOR: u8 = 0x01;
/// Write one sector: `drive(1) track(1) sector(1) data(137)`.
pub const CMD_WRITE_SECTOR: u8 = 0x02;
/// Bind the connection to a client identifier: `idLen(1) id(idLen)`.
pub const CMD_HANDSHAKE: u8 = 0x03;

/// Drive, track and sector as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorAddr {
    /// Drive slot.
    pub drive: u8,
    /// Track number.
    pub track: u8,
    /// Sector within the track.
    pub sector: u8,
}

impl SectorAddr {
    /// Build an address from its three components.
    #[must_use]
    pub fn new(drive: u8, track: u8, sector: u8) -> Self {
        Self {
            drive,
            track,
            sector,
        }
    }

    fn to_bytes(self) -> [u8; 3] {
        [self.drive, self.track, self.sector]
    }

    fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }
}

/// A decoded disk protocol request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskRequest {
    /// Client identifier handshake. An empty `id` means a zero length prefix.
    Handshake {
        /// Raw identifier bytes.
        id: Vec<u8>,
    },
    /// Read the sector at the address.
    ReadSector(SectorAddr),
    /// Overwrite the sector at the address.
    WriteSector(SectorAddr, Box<[u8; SECTOR_SIZE]>),
    /// Any command byte outside the protocol. Carries no payload.
    Unknown(u8),
}

impl DiskRequest {
    /// Decode the next request from `reader`.
    ///
    /// A clean end-of-stream before the command byte yields
    /// [`WireError::Closed`]; running dry inside a frame yields
    /// [`WireError::Truncated`]. Nothing partial is ever returned.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let command = read_command(reader)?;
        match command {
            CMD_HANDSHAKE => {
                let mut len = [0u8; 1];
                read_payload(reader, command, &mut len)?;
                let mut id = vec![0u8; usize::from(len[0])];
                read_payload(reader, command, &mut id)?;
                Ok(DiskRequest::Handshake { id })
            }
            CMD_READ_SECTOR => {
                let mut addr = [0u8; 3];
                read_payload(reader, command, &mut addr)?;
                Ok(DiskRequest::ReadSector(SectorAddr::from_bytes(addr)))
            }
            CMD_WRITE_SECTOR => {
                let mut addr = [0u8; 3];
                read_payload(reader, command, &mut addr)?;
                let mut data = Box::new([0u8; SECTOR_SIZE]);
                read_payload(reader, command, &mut data[..])?;
                Ok(DiskRequest::WriteSector(SectorAddr::from_bytes(addr), data))
            }
            other => Ok(DiskRequest::Unknown(other)),
        }
    }

    /// Encode the request as a client would send it.
    ///
    /// Identifiers longer than 255 bytes are cut to fit the length prefix.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            DiskRequest::Handshake { id } => {
                let len = id.len().min(usize::from(u8::MAX));
                let mut out = Vec::with_capacity(2 + len);
                out.push(CMD_HANDSHAKE);
                out.push(len as u8);
                out.extend_from_slice(&id[..len]);
                out
            }
            DiskRequest::ReadSector(addr) => {
                let mut out = vec![CMD_READ_SECTOR];
                out.extend_from_slice(&addr.to_bytes());
                out
            }
            DiskRequest::WriteSector(addr, data) => {
                let mut out = Vec::with_capacity(4 + SECTOR_SIZE);
                out.push(CMD_WRITE_SECTOR);
                out.extend_from_slice(&addr.to_bytes());
                out.extend_from_slice(&data[..]);
                out
            }
            DiskRequest::Unknown(code) => vec![*code],
        }
    }
}

/// A disk protocol response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskResponse {
    /// Bare success byte.
    Ok,
    /// Bare error byte.
    Error,
    /// Success byte followed by one sector.
    Sector(Box<[u8; SECTOR_SIZE]>),
}

impl DiskResponse {
    /// Encode the response for the wire.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            DiskResponse::Ok => vec![Status::Ok.into()],
            DiskResponse::Error => vec![Status::Error.into()],
            DiskResponse::Sector(data) => {
                let mut out = Vec::with_capacity(1 + SECTOR_SIZE);
                out.push(Status::Ok.into());
                out.extend_from_slice(&data[..]);
                out
            }
        }
    }

    /// Client side: read the answer to a read-sector request.
    pub fn read_sector_reply<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        match Self::read_status(reader)? {
            DiskResponse::Ok => {
                let mut data = Box::new([0u8; SECTOR_SIZE]);
                read_payload(reader, CMD_READ_SECTOR, &mut data[..])?;
                Ok(DiskResponse::Sector(data))
            }
            other => Ok(other),
        }
    }

    /// Client side: read a bare status byte.
    pub fn read_status<R: Read>(reader: &mut R) -> Result<Self, WireError> {
        let status = read_command(reader)?;
        match Status::try_from(status)? {
            Status::Ok => Ok(DiskResponse::Ok),
            Status::Error => Ok(DiskResponse::Error),
            Status::Eof => Err(WireError::UnknownStatus(status)),
        }
    }
}
