//! Pure in-memory encoding/decoding of AFP wire primitives. No I/O.
//!
//! `Writer` is a thin wrapper over a growable byte buffer; `Cursor` is a
//! read cursor over a borrowed byte slice that never copies on decode. Every
//! read operation is total: it either advances the cursor and returns the
//! value, or leaves the cursor untouched and returns an error.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::name::AfpName;

/// Where a [`Cursor::seek`] offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start,
    Current,
    End,
}

#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Emit a Pascal string: one length byte followed by that many raw
    /// bytes. Strings longer than 255 bytes are silently truncated (I6).
    pub fn put_pascal(&mut self, s: &[u8]) {
        let len = s.len().min(255);
        self.buf.put_u8(len as u8);
        self.buf.put_slice(&s[..len]);
    }

    /// Emit an `AfpName`: text encoding (u32), length (u16), then the bytes.
    /// Names longer than 65535 bytes are silently truncated (I6).
    pub fn put_afp_name(&mut self, name: &AfpName) {
        let bytes = name.bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.buf.put_u32(name.text_encoding());
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&bytes[..len]);
    }

    /// Append one zero byte if the buffer's current length is odd.
    pub fn pad_to_even(&mut self) {
        if self.buf.len() % 2 != 0 {
            self.buf.put_u8(0);
        }
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

#[derive(Debug, Clone)]
pub struct Cursor {
    buf: Bytes,
    pos: usize,
}

impl Cursor {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&[u8], Error> {
        if self.remaining() < n {
            return Err(Error::ShortRead);
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(self.read_u64()? as i64)
    }

    /// Read `n` raw bytes as a zero-copy sub-slice of the reply payload.
    pub fn read_raw(&mut self, n: usize) -> Result<Bytes, Error> {
        if self.remaining() < n {
            return Err(Error::ShortRead);
        }
        let start = self.pos;
        self.pos += n;
        Ok(self.buf.slice(start..self.pos))
    }

    /// Read a Pascal string. On a short length byte the cursor is *not*
    /// advanced past the length byte itself.
    pub fn read_pascal(&mut self) -> Result<Bytes, Error> {
        let start = self.pos;
        let len = self.read_u8()? as usize;
        if self.remaining() < len {
            self.pos = start;
            return Err(Error::ShortRead);
        }
        let begin = self.pos;
        self.pos += len;
        Ok(self.buf.slice(begin..self.pos))
    }

    /// Read an `AfpName`. If `read_text_encoding` is false the encoding
    /// defaults to MacRoman (0). On any shortfall the cursor is restored to
    /// its entry position.
    pub fn read_afp_name(&mut self, read_text_encoding: bool) -> Result<AfpName, Error> {
        let start = self.pos;
        let result = (|| {
            let text_encoding = if read_text_encoding {
                self.read_u32()?
            } else {
                AfpName::MAC_ROMAN
            };
            let len = self.read_u16()? as usize;
            let bytes = self.read_raw(len)?;
            Ok(AfpName::new(text_encoding, bytes))
        })();
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    /// Bounds-checked seek. Rejects offsets outside `[0, len]`.
    pub fn seek(&mut self, offset: i64, from: SeekFrom) -> Result<(), Error> {
        let base: i64 = match from {
            SeekFrom::Start => 0,
            SeekFrom::Current => self.pos as i64,
            SeekFrom::End => self.buf.len() as i64,
        };
        let target = base
            .checked_add(offset)
            .ok_or_else(|| Error::malformed("seek overflow"))?;
        if target < 0 || target as usize > self.buf.len() {
            return Err(Error::malformed("seek out of range"));
        }
        self.pos = target as usize;
        Ok(())
    }

    /// Advance one byte if the current position is odd.
    pub fn skip_to_even(&mut self) -> Result<(), Error> {
        if self.pos % 2 != 0 {
            self.read_u8()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_big_endian_integers() {
        let mut w = Writer::new();
        w.put_u8(0xAB);
        w.put_u16(0x1234);
        w.put_u32(0xDEAD_BEEF);
        w.put_u64(0x0102_0304_0506_0708);
        w.put_i16(-1);
        w.put_i32(-2);
        w.put_i64(-3);

        let mut c = Cursor::new(w.freeze());
        assert_eq!(c.read_u8().unwrap(), 0xAB);
        assert_eq!(c.read_u16().unwrap(), 0x1234);
        assert_eq!(c.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(c.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(c.read_i16().unwrap(), -1);
        assert_eq!(c.read_i32().unwrap(), -2);
        assert_eq!(c.read_i64().unwrap(), -3);
    }

    #[test]
    fn pascal_string_round_trips() {
        let mut w = Writer::new();
        w.put_pascal(b"hello");
        let mut c = Cursor::new(w.freeze());
        assert_eq!(&c.read_pascal().unwrap()[..], b"hello");
    }

    #[test]
    fn pascal_string_truncates_over_255_bytes() {
        let long = vec![b'x'; 300];
        let mut w = Writer::new();
        w.put_pascal(&long);
        assert_eq!(w.len(), 1 + 255);
        let mut c = Cursor::new(w.freeze());
        assert_eq!(c.read_pascal().unwrap().len(), 255);
    }

    #[test]
    fn afp_name_round_trips_with_encoding() {
        let mut w = Writer::new();
        let name = AfpName::new(AfpName::UTF8, Bytes::from_static(b"resume.txt"));
        w.put_afp_name(&name);
        let mut c = Cursor::new(w.freeze());
        let decoded = c.read_afp_name(true).unwrap();
        assert_eq!(decoded, name);
    }

    #[test]
    fn afp_name_defaults_to_mac_roman_without_encoding_field() {
        let mut w = Writer::new();
        w.put_u16(4);
        w.put_bytes(b"test");
        let mut c = Cursor::new(w.freeze());
        let decoded = c.read_afp_name(false).unwrap();
        assert_eq!(decoded.text_encoding(), AfpName::MAC_ROMAN);
        assert_eq!(&decoded.bytes()[..], b"test");
    }

    #[test]
    fn short_read_leaves_cursor_untouched() {
        let mut w = Writer::new();
        w.put_u8(1);
        let mut c = Cursor::new(w.freeze());
        let before = c.pos();
        assert!(matches!(c.read_u32(), Err(Error::ShortRead)));
        assert_eq!(c.pos(), before);
    }

    #[test]
    fn pascal_short_read_rewinds_past_the_length_byte() {
        let mut w = Writer::new();
        w.put_u8(10); // claims 10 bytes follow
        w.put_bytes(b"ab");
        let mut c = Cursor::new(w.freeze());
        assert!(matches!(c.read_pascal(), Err(Error::ShortRead)));
        // cursor is restored to the start of the failed read
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn pad_to_even_appends_zero_only_on_odd_length() {
        let mut w = Writer::new();
        w.put_u8(1);
        w.pad_to_even();
        assert_eq!(w.len(), 2);
        assert_eq!(w.as_slice()[1], 0);

        let mut w2 = Writer::new();
        w2.put_u16(1);
        w2.pad_to_even();
        assert_eq!(w2.len(), 2);
    }

    #[test]
    fn skip_to_even_advances_only_when_odd() {
        let mut w = Writer::new();
        w.put_bytes(&[1, 2, 3, 0]);
        let mut c = Cursor::new(w.freeze());
        c.read_u8().unwrap();
        assert_eq!(c.pos(), 1);
        c.skip_to_even().unwrap();
        assert_eq!(c.pos(), 2);
        c.skip_to_even().unwrap();
        assert_eq!(c.pos(), 2);
    }

    #[test]
    fn seek_rejects_out_of_range_offsets() {
        let mut w = Writer::new();
        w.put_bytes(&[0; 4]);
        let mut c = Cursor::new(w.freeze());
        assert!(c.seek(10, SeekFrom::Start).is_err());
        assert!(c.seek(-1, SeekFrom::Start).is_err());
        assert!(c.seek(2, SeekFrom::Start).is_ok());
        assert_eq!(c.pos(), 2);
        assert!(c.seek(0, SeekFrom::End).is_ok());
        assert_eq!(c.pos(), 4);
    }
}
