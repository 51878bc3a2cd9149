//! Typed bitmap and attribute-flag constants. AFP bitmaps are plain u16/u32
//! words on the wire, but which bit means what — and the order fields
//! appear in once a bitmap selects them — is part of the protocol, so each
//! family gets its own flag type instead of passing raw integers around.

use bitflags::bitflags;

bitflags! {
    /// Selects fields of a `GET_VOL_PARMS`/`OPEN_VOL` reply, in this bit
    /// order (ascending value = wire order).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VolBitmap: u16 {
        const ATTRIBUTE       = 0x0001;
        const SIGNATURE       = 0x0002;
        const CREATE_DATE     = 0x0004;
        const MOD_DATE        = 0x0008;
        const BACKUP_DATE     = 0x0010;
        const VOL_ID          = 0x0020;
        const BYTES_FREE      = 0x0040;
        const BYTES_TOTAL     = 0x0080;
        const NAME            = 0x0100;
        const EXT_BYTES_FREE  = 0x0200;
        const EXT_BYTES_TOTAL = 0x0400;
        const BLOCK_SIZE      = 0x0800;
    }
}

bitflags! {
    /// `volumeAttributes` bits returned in a `GET_VOL_PARMS`/`OPEN_VOL` reply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VolAttributes: u16 {
        const READ_ONLY             = 0x0001;
        const HAS_VOLUME_PASSWORD   = 0x0002;
        const SUPPORTS_FILE_IDS     = 0x0004;
        const SUPPORTS_CAT_SEARCH   = 0x0008;
        const SUPPORTS_BLANK_ACCESS = 0x0010;
        const NO_NETWORK_USER_ID    = 0x0040;
        const SUPPORTS_UNIX_PRIVS   = 0x0200;
        const SUPPORTS_UTF8_NAMES   = 0x0400;
    }
}

bitflags! {
    /// Shared by `GET_FILE_DIR_PARMS`'s file half and `OPEN_FORK`/`GET_FORK_PARMS`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileBitmap: u16 {
        const ATTRIBUTE          = 0x0001;
        const PARENT_DIR_ID      = 0x0002;
        const CREATE_DATE        = 0x0004;
        const MOD_DATE           = 0x0008;
        const BACKUP_DATE        = 0x0010;
        const FINDER_INFO        = 0x0020;
        const LONG_NAME          = 0x0040;
        const SHORT_NAME         = 0x0080;
        const NODE_ID            = 0x0100;
        const DATA_FORK_LEN      = 0x0200;
        const RSRC_FORK_LEN      = 0x0400;
        const EXT_DATA_FORK_LEN  = 0x0800;
        const LAUNCH_LIMIT       = 0x1000;
        const UTF8_NAME          = 0x2000;
        const EXT_RSRC_FORK_LEN  = 0x4000;
        const UNIX_PRIVS         = 0x8000;
    }
}

bitflags! {
    /// `GET_FILE_DIR_PARMS`'s directory half.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirBitmap: u16 {
        const ATTRIBUTE     = 0x0001;
        const PARENT_DIR_ID = 0x0002;
        const CREATE_DATE   = 0x0004;
        const MOD_DATE      = 0x0008;
        const BACKUP_DATE   = 0x0010;
        const FINDER_INFO   = 0x0020;
        const LONG_NAME     = 0x0040;
        const SHORT_NAME    = 0x0080;
        const NODE_ID       = 0x0100;
        const OFFSPRING_COUNT = 0x0200;
        const OWNER_ID      = 0x0400;
        const GROUP_ID      = 0x0800;
        const ACCESS_RIGHTS = 0x1000;
        const UTF8_NAME     = 0x2000;
        const UNIX_PRIVS    = 0x8000;
    }
}

bitflags! {
    /// Invisible/system/write-inhibit... bits shared by files and directories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileDirAttributesBitmap: u16 {
        const INVISIBLE      = 0x0001;
        const MULTI_USER     = 0x0002;
        const SYSTEM         = 0x0004;
        const DATA_FORK_OPEN = 0x0010;
        const RSRC_FORK_OPEN = 0x0020;
        const WRITE_INHIBIT  = 0x0040;
        const BACKUP_NEEDED  = 0x0080;
        const RENAME_INHIBIT = 0x0100;
        const DELETE_INHIBIT = 0x0200;
        const COPY_PROTECT   = 0x0400;
        const SET_CLEAR      = 0x8000;
    }
}

bitflags! {
    /// `OPEN_FORK`'s requested access mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AfpAccessMode: u16 {
        const READ        = 0x0001;
        const WRITE       = 0x0002;
        const DENY_READ   = 0x0010;
        const DENY_WRITE  = 0x0020;
    }
}

/// Which name form a pathname field on the wire is encoded as. The core
/// always *encodes* `UTF8_NAME` and accepts any of the three on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfpPathType {
    ShortName,
    LongName,
    Utf8Name,
}

impl AfpPathType {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::ShortName => 1,
            Self::LongName => 2,
            Self::Utf8Name => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::ShortName),
            2 => Some(Self::LongName),
            3 => Some(Self::Utf8Name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vol_bitmap_bits_are_independent() {
        let b = VolBitmap::VOL_ID | VolBitmap::ATTRIBUTE;
        assert!(b.contains(VolBitmap::VOL_ID));
        assert!(b.contains(VolBitmap::ATTRIBUTE));
        assert!(!b.contains(VolBitmap::NAME));
        assert_eq!(b.bits(), 0x0021);
    }

    #[test]
    fn path_type_round_trips() {
        for t in [AfpPathType::ShortName, AfpPathType::LongName, AfpPathType::Utf8Name] {
            assert_eq!(AfpPathType::from_u8(t.as_u8()), Some(t));
        }
        assert_eq!(AfpPathType::from_u8(0), None);
    }
}
