//! `AfpName`: a file/directory name paired with the text encoding it was
//! written in. Cheap to clone — the underlying bytes are reference counted.

use bytes::Bytes;

/// A name as carried on the wire: a text encoding tag plus the raw bytes.
/// Two names compare equal only if both the encoding and the bytes match;
/// this type does not normalize or transcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AfpName {
    text_encoding: u32,
    bytes: Bytes,
}

impl AfpName {
    /// The classic Mac OS Roman encoding, and the implicit encoding of any
    /// name field that has no accompanying text-encoding word on the wire.
    pub const MAC_ROMAN: u32 = 0;
    /// UTF-8, used by AFP 3.x's long-name fields.
    pub const UTF8: u32 = 0x8000_0103;

    pub fn new(text_encoding: u32, bytes: impl Into<Bytes>) -> Self {
        Self {
            text_encoding,
            bytes: bytes.into(),
        }
    }

    pub fn from_utf8_str(s: &str) -> Self {
        Self::new(Self::UTF8, Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn text_encoding(&self) -> u32 {
        self.text_encoding
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Lossy UTF-8 decode, regardless of the recorded encoding. Useful for
    /// logging and diagnostics; not a substitute for real transcoding.
    pub fn to_string_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl std::fmt::Display for AfpName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_matching_encoding_and_bytes() {
        let a = AfpName::new(AfpName::UTF8, Bytes::from_static(b"foo"));
        let b = AfpName::new(AfpName::UTF8, Bytes::from_static(b"foo"));
        let c = AfpName::new(AfpName::MAC_ROMAN, Bytes::from_static(b"foo"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn from_utf8_str_round_trips_through_display() {
        let name = AfpName::from_utf8_str("résumé.txt");
        assert_eq!(name.to_string(), "résumé.txt");
    }
}
