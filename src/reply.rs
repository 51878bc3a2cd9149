//! `Reply`: a read cursor over one server-returned AFP reply payload,
//! paired with the AFP result code carried in the DSI header.

use bytes::Bytes;

use crate::codec::{Cursor, SeekFrom};
use crate::error::Error;
use crate::name::AfpName;
use crate::result::AfpResultCode;

pub struct Reply {
    result_code: AfpResultCode,
    cursor: Cursor,
}

impl Reply {
    pub fn new(result_code: AfpResultCode, payload: Bytes) -> Self {
        Self {
            result_code,
            cursor: Cursor::new(payload),
        }
    }

    pub fn result_code(&self) -> AfpResultCode {
        self.result_code
    }

    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }

    pub fn len(&self) -> usize {
        self.cursor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty()
    }

    pub fn pos(&self) -> usize {
        self.cursor.pos()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        self.cursor.read_u8()
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        self.cursor.read_u16()
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        self.cursor.read_u32()
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        self.cursor.read_u64()
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        self.cursor.read_i16()
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.cursor.read_i32()
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        self.cursor.read_i64()
    }

    pub fn read_raw(&mut self, n: usize) -> Result<Bytes, Error> {
        self.cursor.read_raw(n)
    }

    pub fn read_pascal(&mut self) -> Result<Bytes, Error> {
        self.cursor.read_pascal()
    }

    pub fn read_afp_name(&mut self, read_text_encoding: bool) -> Result<AfpName, Error> {
        self.cursor.read_afp_name(read_text_encoding)
    }

    pub fn seek(&mut self, offset: i64, from: SeekFrom) -> Result<(), Error> {
        self.cursor.seek(offset, from)
    }

    pub fn skip_to_even(&mut self) -> Result<(), Error> {
        self.cursor.skip_to_even()
    }

    /// Turn a non-success result code into `Err`, applying `map` to
    /// translate it into a domain error. Leaves the cursor untouched either
    /// way; callers decode fields only after checking this.
    pub fn ok_or_else(&self, map: impl FnOnce(AfpResultCode) -> Error) -> Result<(), Error> {
        if self.is_success() {
            Ok(())
        } else {
            Err(map(self.result_code))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Writer;

    #[test]
    fn result_code_and_payload_round_trip() {
        let mut w = Writer::new();
        w.put_u16(0x1234);
        w.put_pascal(b"vol");
        let reply = Reply::new(AfpResultCode::NoError, w.freeze());
        assert!(reply.is_success());
        assert_eq!(reply.len(), 2 + 1 + 3);
    }

    #[test]
    fn ok_or_else_maps_failure_without_consuming_payload() {
        let reply = Reply::new(AfpResultCode::ObjectNotFound, Bytes::new());
        let err = reply
            .ok_or_else(|_| Error::NotFound)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn decodes_fields_in_order_after_success_check() {
        let mut w = Writer::new();
        w.put_u16(0x0020);
        w.put_u16(7);
        let mut reply = Reply::new(AfpResultCode::NoError, w.freeze());
        reply.ok_or_else(|_| Error::NotFound).unwrap();
        assert_eq!(reply.read_u16().unwrap(), 0x0020);
        assert_eq!(reply.read_u16().unwrap(), 7);
    }
}
