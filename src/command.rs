//! `Command`: one outbound AFP command body plus the tag that tells the
//! connection which DSI opcode and write offset to frame it with.

use bytes::Bytes;

use crate::codec::Writer;
use crate::name::AfpName;

/// The closed set of AFP command codes this client ever sends. Numeric
/// values are the command's wire byte, per `gvfsafpconnection.h`'s
/// `AfpCommandType` enum and the AFP protocol's own command numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfpCommandType {
    CloseFork,
    CopyFile,
    CreateDir,
    CreateFile,
    Delete,
    GetForkParms,
    GetSrvrInfo,
    GetSrvrParms,
    GetVolParms,
    Login,
    LoginCont,
    MoveAndRename,
    OpenVol,
    OpenFork,
    Rename,
    SetForkParms,
    Write,
    GetFileDirParms,
    SetFileDirParms,
    ExchangeFiles,
    ReadExt,
    WriteExt,
    EnumerateExt,
    EnumerateExt2,
}

impl AfpCommandType {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::CopyFile => 5,
            Self::CreateDir => 6,
            Self::CreateFile => 7,
            Self::Delete => 8,
            Self::CloseFork => 4,
            Self::GetForkParms => 14,
            Self::GetSrvrInfo => 15,
            Self::GetSrvrParms => 16,
            Self::GetVolParms => 17,
            Self::Login => 18,
            Self::LoginCont => 19,
            Self::MoveAndRename => 23,
            Self::OpenVol => 24,
            Self::OpenFork => 26,
            Self::Rename => 28,
            Self::SetForkParms => 31,
            Self::Write => 33,
            Self::GetFileDirParms => 34,
            Self::SetFileDirParms => 35,
            Self::ExchangeFiles => 42,
            Self::ReadExt => 60,
            Self::WriteExt => 61,
            Self::EnumerateExt => 66,
            Self::EnumerateExt2 => 68,
        }
    }

    /// The DSI opcode and (for writes) the write-offset this command type is
    /// framed with, per §4.2's table.
    pub fn dsi_framing(self) -> (crate::dsi::DsiOpcode, u32) {
        match self {
            Self::Write => (crate::dsi::DsiOpcode::Write, 8),
            Self::WriteExt => (crate::dsi::DsiOpcode::Write, 20),
            _ => (crate::dsi::DsiOpcode::Command, 0),
        }
    }
}

/// A growable outbound command buffer. The first byte written is always
/// the command's own AFP opcode byte, matching every operation's canonical
/// encoding in §4.4.
pub struct Command {
    command_type: AfpCommandType,
    writer: Writer,
    /// Extra trailing bytes transmitted immediately after the command body
    /// on the wire (the attached write payload for `WRITE`/`WRITE_EXT`).
    trailing: Option<Bytes>,
}

impl Command {
    pub fn new(command_type: AfpCommandType) -> Self {
        let mut writer = Writer::new();
        writer.put_u8(command_type.as_u8());
        Self {
            command_type,
            writer,
            trailing: None,
        }
    }

    pub fn command_type(&self) -> AfpCommandType {
        self.command_type
    }

    pub fn put_pad(&mut self) {
        self.writer.put_u8(0);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.writer.put_u8(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.writer.put_u16(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.writer.put_u32(v);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.writer.put_u64(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.writer.put_i16(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.writer.put_i32(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.writer.put_i64(v);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.writer.put_bytes(bytes);
    }

    pub fn put_pascal(&mut self, s: &[u8]) {
        self.writer.put_pascal(s);
    }

    pub fn put_afp_name(&mut self, name: &AfpName) {
        self.writer.put_afp_name(name);
    }

    pub fn pad_to_even(&mut self) {
        self.writer.pad_to_even();
    }

    /// Attach data to be written immediately after this command's body on
    /// the wire (`WRITE`/`WRITE_EXT`'s payload). Does not count towards
    /// `payload()`'s length: the connection transmits it as a second
    /// segment, per §4.4's `WRITE_TO_FORK`.
    pub fn attach_trailing_data(&mut self, data: Bytes) {
        self.trailing = Some(data);
    }

    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    /// The command body, and the trailing data (if any) to be written right
    /// after it — together these form the full DSI payload whose length is
    /// the frame's `totalDataLength`.
    pub fn into_parts(self) -> (Bytes, Option<Bytes>) {
        (self.writer.freeze(), self.trailing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_body_starts_with_its_own_opcode_byte() {
        let mut cmd = Command::new(AfpCommandType::Delete);
        cmd.put_pad();
        cmd.put_u16(7);
        let (body, trailing) = cmd.into_parts();
        assert_eq!(body[0], AfpCommandType::Delete.as_u8());
        assert!(trailing.is_none());
    }

    #[test]
    fn write_ext_frames_as_dsi_write_with_offset_20() {
        let (opcode, offset) = AfpCommandType::WriteExt.dsi_framing();
        assert_eq!(opcode, crate::dsi::DsiOpcode::Write);
        assert_eq!(offset, 20);
    }

    #[test]
    fn plain_command_frames_as_dsi_command_with_zero_offset() {
        let (opcode, offset) = AfpCommandType::GetVolParms.dsi_framing();
        assert_eq!(opcode, crate::dsi::DsiOpcode::Command);
        assert_eq!(offset, 0);
    }

    #[test]
    fn trailing_data_is_attached_but_excluded_from_body_length() {
        let mut cmd = Command::new(AfpCommandType::WriteExt);
        cmd.put_u8(0);
        cmd.put_i16(5);
        let body_len_before = cmd.len();
        cmd.attach_trailing_data(Bytes::from_static(b"hello world"));
        assert_eq!(cmd.len(), body_len_before);
        let (body, trailing) = cmd.into_parts();
        assert_eq!(body.len(), body_len_before);
        assert_eq!(&trailing.unwrap()[..], b"hello world");
    }
}
