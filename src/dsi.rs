//! DSI (Data Stream Interface) framing: the 16-byte header that wraps every
//! PDU exchanged over the AFP TCP transport.

use crate::codec::{Cursor, Writer};
use crate::error::Error;

pub const HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsiFlags {
    Request,
    Reply,
}

impl DsiFlags {
    fn as_u8(self) -> u8 {
        match self {
            Self::Request => 0,
            Self::Reply => 1,
        }
    }

    fn from_u8(v: u8) -> Result<Self, Error> {
        match v {
            0 => Ok(Self::Request),
            1 => Ok(Self::Reply),
            other => Err(Error::malformed(format!("unknown DSI flags byte {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsiOpcode {
    CloseSession,
    Command,
    GetStatus,
    OpenSession,
    Tickle,
    Write,
    /// Reserved for an opcode the server sent that this client doesn't
    /// recognize; carried through rather than rejected outright.
    Unknown(u8),
}

impl DsiOpcode {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::CloseSession => 1,
            Self::Command => 2,
            Self::GetStatus => 3,
            Self::OpenSession => 4,
            Self::Tickle => 5,
            Self::Write => 6,
            Self::Unknown(v) => v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::CloseSession,
            2 => Self::Command,
            3 => Self::GetStatus,
            4 => Self::OpenSession,
            5 => Self::Tickle,
            6 => Self::Write,
            other => Self::Unknown(other),
        }
    }
}

/// The 16-byte DSI header. `error_or_offset` is the request-write offset on
/// a DSI_WRITE request and the AFP result code on a reply; callers interpret
/// it according to `flags`/`command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsiHeader {
    pub flags: DsiFlags,
    pub command: DsiOpcode,
    pub request_id: u16,
    pub error_or_offset: u32,
    pub total_data_length: u32,
    pub reserved: u32,
}

impl DsiHeader {
    pub fn encode(&self, w: &mut Writer) {
        w.put_u8(self.flags.as_u8());
        w.put_u8(self.command.as_u8());
        w.put_u16(self.request_id);
        w.put_u32(self.error_or_offset);
        w.put_u32(self.total_data_length);
        w.put_u32(self.reserved);
    }

    pub fn decode(c: &mut Cursor) -> Result<Self, Error> {
        let flags = DsiFlags::from_u8(c.read_u8()?)?;
        let command = DsiOpcode::from_u8(c.read_u8()?);
        let request_id = c.read_u16()?;
        let error_or_offset = c.read_u32()?;
        let total_data_length = c.read_u32()?;
        let reserved = c.read_u32()?;
        Ok(Self {
            flags,
            command,
            request_id,
            error_or_offset,
            total_data_length,
            reserved,
        })
    }

    /// Parse a header out of a fixed 16-byte array, as read directly off the
    /// socket by the reader half of the connection.
    pub fn decode_bytes(buf: [u8; HEADER_LEN]) -> Result<Self, Error> {
        let mut c = Cursor::new(bytes::Bytes::copy_from_slice(&buf));
        Self::decode(&mut c)
    }

    pub fn encode_bytes(&self) -> [u8; HEADER_LEN] {
        let mut w = Writer::with_capacity(HEADER_LEN);
        self.encode(&mut w);
        let frozen = w.freeze();
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(&frozen);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = DsiHeader {
            flags: DsiFlags::Request,
            command: DsiOpcode::Command,
            request_id: 42,
            error_or_offset: 0,
            total_data_length: 128,
            reserved: 0,
        };
        let bytes = header.encode_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = DsiHeader::decode_bytes(bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn unknown_opcode_is_preserved_not_rejected() {
        assert_eq!(DsiOpcode::from_u8(200), DsiOpcode::Unknown(200));
        assert_eq!(DsiOpcode::Unknown(200).as_u8(), 200);
    }

    #[test]
    fn bad_flags_byte_is_rejected() {
        let mut w = Writer::with_capacity(HEADER_LEN);
        w.put_u8(9);
        w.put_u8(DsiOpcode::Command.as_u8());
        w.put_u16(0);
        w.put_u32(0);
        w.put_u32(0);
        w.put_u32(0);
        let mut c = Cursor::new(w.freeze());
        assert!(DsiHeader::decode(&mut c).is_err());
    }
}
