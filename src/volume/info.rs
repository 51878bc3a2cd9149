//! Shared bitmap-driven decode records. `gvfsafpvolume.c`'s `fill_info`
//! (called from `OPEN_FORK`, `GET_FORK_PARMS`, `GET_FILE_DIR_PARMS`, and
//! `ENUMERATE`'s per-record loop) decodes one reply buffer according to
//! whichever bitmap the caller requested; this module is that routine, split
//! into a volume-level record and a file/dir-level record.

use bytes::Bytes;

use crate::bitmap::{DirBitmap, FileBitmap, FileDirAttributesBitmap, VolBitmap};
use crate::codec::SeekFrom;
use crate::error::Error;
use crate::name::AfpName;
use crate::reply::Reply;

/// `UNIX_PRIVS`' four u32 fields, shared by the file and directory bitmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixPrivs {
    pub uid: u32,
    pub gid: u32,
    pub permissions: u32,
    pub ua_permissions: u32,
}

impl UnixPrivs {
    fn decode(c: &mut Reply) -> Result<Self, Error> {
        Ok(Self {
            uid: c.read_u32()?,
            gid: c.read_u32()?,
            permissions: c.read_u32()?,
            ua_permissions: c.read_u32()?,
        })
    }
}

/// A name field on the wire is a u16 offset (relative to the start of the
/// bitmap-driven record) pointing to where the actual string lives. Fixed
/// fields are read first; name fields are resolved afterwards by seeking to
/// `record_base + offset`.
enum PendingName {
    Pascal,
    Utf8,
}

/// `FileBitmap`-driven record, shared verbatim by `OPEN_FORK`'s reply (after
/// its `forkRefNum`) and `GET_FORK_PARMS`'s reply.
#[derive(Debug, Clone, Default)]
pub struct ForkInfo {
    pub attributes: Option<FileDirAttributesBitmap>,
    pub parent_dir_id: Option<u32>,
    pub create_date: Option<i32>,
    pub mod_date: Option<i32>,
    pub backup_date: Option<i32>,
    pub finder_info: Option<Bytes>,
    pub long_name: Option<Bytes>,
    pub short_name: Option<Bytes>,
    pub node_id: Option<u32>,
    pub data_fork_len: Option<u64>,
    pub rsrc_fork_len: Option<u64>,
    pub utf8_name: Option<AfpName>,
    pub unix_privs: Option<UnixPrivs>,
}

impl ForkInfo {
    /// Decode the fields selected by `bitmap`, in ascending bit order (wire
    /// order). `c` must be positioned at the start of the record.
    pub fn decode(c: &mut Reply, bitmap: FileBitmap) -> Result<Self, Error> {
        let base = c.pos();
        let mut info = Self::default();
        let mut pending: Vec<(u16, PendingName)> = Vec::new();

        if bitmap.contains(FileBitmap::ATTRIBUTE) {
            info.attributes = Some(FileDirAttributesBitmap::from_bits_truncate(c.read_u16()?));
        }
        if bitmap.contains(FileBitmap::PARENT_DIR_ID) {
            info.parent_dir_id = Some(c.read_u32()?);
        }
        if bitmap.contains(FileBitmap::CREATE_DATE) {
            info.create_date = Some(c.read_i32()?);
        }
        if bitmap.contains(FileBitmap::MOD_DATE) {
            info.mod_date = Some(c.read_i32()?);
        }
        if bitmap.contains(FileBitmap::BACKUP_DATE) {
            info.backup_date = Some(c.read_i32()?);
        }
        if bitmap.contains(FileBitmap::FINDER_INFO) {
            info.finder_info = Some(c.read_raw(32)?);
        }
        if bitmap.contains(FileBitmap::LONG_NAME) {
            pending.push((c.read_u16()?, PendingName::Pascal));
        }
        if bitmap.contains(FileBitmap::SHORT_NAME) {
            pending.push((c.read_u16()?, PendingName::Pascal));
        }
        if bitmap.contains(FileBitmap::NODE_ID) {
            info.node_id = Some(c.read_u32()?);
        }
        if bitmap.contains(FileBitmap::DATA_FORK_LEN) {
            info.data_fork_len = Some(c.read_u32()? as u64);
        }
        if bitmap.contains(FileBitmap::RSRC_FORK_LEN) {
            info.rsrc_fork_len = Some(c.read_u32()? as u64);
        }
        if bitmap.contains(FileBitmap::EXT_DATA_FORK_LEN) {
            info.data_fork_len = Some(c.read_u64()?);
        }
        if bitmap.contains(FileBitmap::LAUNCH_LIMIT) {
            return Err(Error::unsupported("LAUNCH_LIMIT bitmap field"));
        }
        if bitmap.contains(FileBitmap::UTF8_NAME) {
            pending.push((c.read_u16()?, PendingName::Utf8));
        }
        if bitmap.contains(FileBitmap::EXT_RSRC_FORK_LEN) {
            info.rsrc_fork_len = Some(c.read_u64()?);
        }
        if bitmap.contains(FileBitmap::UNIX_PRIVS) {
            info.unix_privs = Some(UnixPrivs::decode(c)?);
        }

        for (offset, kind) in pending {
            c.seek(base as i64 + offset as i64, SeekFrom::Start)?;
            match kind {
                PendingName::Pascal => {
                    let bytes = c.read_pascal()?;
                    // The first pending Pascal wins LONG_NAME, the second
                    // (if present) SHORT_NAME — recorded in bitmap order above.
                    if info.long_name.is_none() && bitmap.contains(FileBitmap::LONG_NAME) {
                        info.long_name = Some(bytes);
                    } else {
                        info.short_name = Some(bytes);
                    }
                }
                PendingName::Utf8 => {
                    info.utf8_name = Some(c.read_afp_name(true)?);
                }
            }
        }

        Ok(info)
    }
}

/// The combined file/directory record decoded by `GET_FILE_DIR_PARMS` and
/// each `ENUMERATE` record, selecting `FileBitmap` or `DirBitmap` fields
/// depending on whether the entry is a directory.
#[derive(Debug, Clone, Default)]
pub struct FileDirInfo {
    pub is_directory: bool,
    pub attributes: Option<FileDirAttributesBitmap>,
    pub parent_dir_id: Option<u32>,
    pub create_date: Option<i32>,
    pub mod_date: Option<i32>,
    pub backup_date: Option<i32>,
    pub finder_info: Option<Bytes>,
    pub long_name: Option<Bytes>,
    pub short_name: Option<Bytes>,
    pub node_id: Option<u32>,
    pub data_fork_len: Option<u64>,
    pub rsrc_fork_len: Option<u64>,
    pub offspring_count: Option<u16>,
    pub owner_id: Option<u32>,
    pub group_id: Option<u32>,
    pub access_rights: Option<u32>,
    pub utf8_name: Option<AfpName>,
    pub unix_privs: Option<UnixPrivs>,
}

impl FileDirInfo {
    pub fn decode(
        c: &mut Reply,
        file_bitmap: FileBitmap,
        dir_bitmap: DirBitmap,
        is_directory: bool,
    ) -> Result<Self, Error> {
        let base = c.pos();
        let mut info = Self {
            is_directory,
            ..Self::default()
        };
        let mut pending: Vec<(u16, PendingName)> = Vec::new();

        if is_directory {
            if dir_bitmap.contains(DirBitmap::ATTRIBUTE) {
                info.attributes = Some(FileDirAttributesBitmap::from_bits_truncate(c.read_u16()?));
            }
            if dir_bitmap.contains(DirBitmap::PARENT_DIR_ID) {
                info.parent_dir_id = Some(c.read_u32()?);
            }
            if dir_bitmap.contains(DirBitmap::CREATE_DATE) {
                info.create_date = Some(c.read_i32()?);
            }
            if dir_bitmap.contains(DirBitmap::MOD_DATE) {
                info.mod_date = Some(c.read_i32()?);
            }
            if dir_bitmap.contains(DirBitmap::BACKUP_DATE) {
                info.backup_date = Some(c.read_i32()?);
            }
            if dir_bitmap.contains(DirBitmap::FINDER_INFO) {
                info.finder_info = Some(c.read_raw(32)?);
            }
            if dir_bitmap.contains(DirBitmap::LONG_NAME) {
                pending.push((c.read_u16()?, PendingName::Pascal));
            }
            if dir_bitmap.contains(DirBitmap::SHORT_NAME) {
                pending.push((c.read_u16()?, PendingName::Pascal));
            }
            if dir_bitmap.contains(DirBitmap::NODE_ID) {
                info.node_id = Some(c.read_u32()?);
            }
            if dir_bitmap.contains(DirBitmap::OFFSPRING_COUNT) {
                info.offspring_count = Some(c.read_u16()?);
            }
            if dir_bitmap.contains(DirBitmap::OWNER_ID) {
                info.owner_id = Some(c.read_u32()?);
            }
            if dir_bitmap.contains(DirBitmap::GROUP_ID) {
                info.group_id = Some(c.read_u32()?);
            }
            if dir_bitmap.contains(DirBitmap::ACCESS_RIGHTS) {
                info.access_rights = Some(c.read_u32()?);
            }
            if dir_bitmap.contains(DirBitmap::UTF8_NAME) {
                pending.push((c.read_u16()?, PendingName::Utf8));
            }
            if dir_bitmap.contains(DirBitmap::UNIX_PRIVS) {
                info.unix_privs = Some(UnixPrivs::decode(c)?);
            }
        } else {
            if file_bitmap.contains(FileBitmap::ATTRIBUTE) {
                info.attributes = Some(FileDirAttributesBitmap::from_bits_truncate(c.read_u16()?));
            }
            if file_bitmap.contains(FileBitmap::PARENT_DIR_ID) {
                info.parent_dir_id = Some(c.read_u32()?);
            }
            if file_bitmap.contains(FileBitmap::CREATE_DATE) {
                info.create_date = Some(c.read_i32()?);
            }
            if file_bitmap.contains(FileBitmap::MOD_DATE) {
                info.mod_date = Some(c.read_i32()?);
            }
            if file_bitmap.contains(FileBitmap::BACKUP_DATE) {
                info.backup_date = Some(c.read_i32()?);
            }
            if file_bitmap.contains(FileBitmap::FINDER_INFO) {
                info.finder_info = Some(c.read_raw(32)?);
            }
            if file_bitmap.contains(FileBitmap::LONG_NAME) {
                pending.push((c.read_u16()?, PendingName::Pascal));
            }
            if file_bitmap.contains(FileBitmap::SHORT_NAME) {
                pending.push((c.read_u16()?, PendingName::Pascal));
            }
            if file_bitmap.contains(FileBitmap::NODE_ID) {
                info.node_id = Some(c.read_u32()?);
            }
            if file_bitmap.contains(FileBitmap::DATA_FORK_LEN) {
                info.data_fork_len = Some(c.read_u32()? as u64);
            }
            if file_bitmap.contains(FileBitmap::RSRC_FORK_LEN) {
                info.rsrc_fork_len = Some(c.read_u32()? as u64);
            }
            if file_bitmap.contains(FileBitmap::EXT_DATA_FORK_LEN) {
                info.data_fork_len = Some(c.read_u64()?);
            }
            if file_bitmap.contains(FileBitmap::LAUNCH_LIMIT) {
                return Err(Error::unsupported("LAUNCH_LIMIT bitmap field"));
            }
            if file_bitmap.contains(FileBitmap::UTF8_NAME) {
                pending.push((c.read_u16()?, PendingName::Utf8));
            }
            if file_bitmap.contains(FileBitmap::EXT_RSRC_FORK_LEN) {
                info.rsrc_fork_len = Some(c.read_u64()?);
            }
            if file_bitmap.contains(FileBitmap::UNIX_PRIVS) {
                info.unix_privs = Some(UnixPrivs::decode(c)?);
            }
        }

        for (offset, kind) in pending {
            c.seek(base as i64 + offset as i64, SeekFrom::Start)?;
            match kind {
                PendingName::Pascal => {
                    let bytes = c.read_pascal()?;
                    if info.long_name.is_none() {
                        info.long_name = Some(bytes);
                    } else {
                        info.short_name = Some(bytes);
                    }
                }
                PendingName::Utf8 => {
                    info.utf8_name = Some(c.read_afp_name(true)?);
                }
            }
        }

        Ok(info)
    }
}

/// `VolBitmap`-driven record returned by `GET_VOL_PARMS` (and the subset of
/// it echoed by `OPEN_VOL`).
#[derive(Debug, Clone, Default)]
pub struct VolumeInfo {
    pub attributes: Option<u16>,
    pub signature: Option<u16>,
    pub create_date: Option<i32>,
    pub mod_date: Option<i32>,
    pub backup_date: Option<i32>,
    pub volume_id: Option<u16>,
    pub bytes_free: Option<u64>,
    pub bytes_total: Option<u64>,
    pub name: Option<Bytes>,
    pub block_size: Option<u32>,
}

impl VolumeInfo {
    pub fn decode(c: &mut Reply, bitmap: VolBitmap) -> Result<Self, Error> {
        let base = c.pos();
        let mut info = Self::default();
        let mut pending_name: Option<u16> = None;

        if bitmap.contains(VolBitmap::ATTRIBUTE) {
            info.attributes = Some(c.read_u16()?);
        }
        if bitmap.contains(VolBitmap::SIGNATURE) {
            info.signature = Some(c.read_u16()?);
        }
        if bitmap.contains(VolBitmap::CREATE_DATE) {
            info.create_date = Some(c.read_i32()?);
        }
        if bitmap.contains(VolBitmap::MOD_DATE) {
            info.mod_date = Some(c.read_i32()?);
        }
        if bitmap.contains(VolBitmap::BACKUP_DATE) {
            info.backup_date = Some(c.read_i32()?);
        }
        if bitmap.contains(VolBitmap::VOL_ID) {
            info.volume_id = Some(c.read_u16()?);
        }
        if bitmap.contains(VolBitmap::BYTES_FREE) {
            info.bytes_free = Some(c.read_u32()? as u64);
        }
        if bitmap.contains(VolBitmap::BYTES_TOTAL) {
            info.bytes_total = Some(c.read_u32()? as u64);
        }
        if bitmap.contains(VolBitmap::NAME) {
            pending_name = Some(c.read_u16()?);
        }
        if bitmap.contains(VolBitmap::EXT_BYTES_FREE) {
            info.bytes_free = Some(c.read_u64()?);
        }
        if bitmap.contains(VolBitmap::EXT_BYTES_TOTAL) {
            info.bytes_total = Some(c.read_u64()?);
        }
        if bitmap.contains(VolBitmap::BLOCK_SIZE) {
            info.block_size = Some(c.read_u32()?);
        }

        if let Some(offset) = pending_name {
            c.seek(base as i64 + offset as i64, SeekFrom::Start)?;
            info.name = Some(c.read_pascal()?);
        }

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Writer;
    use crate::result::AfpResultCode;

    fn reply_of(bytes: Bytes) -> Reply {
        Reply::new(AfpResultCode::NoError, bytes)
    }

    #[test]
    fn fork_info_decodes_requested_fields_in_bitmap_order() {
        let mut w = Writer::new();
        w.put_u16(0x0200); // DATA_FORK_LEN
        w.put_u32(12345);
        let bitmap = FileBitmap::DATA_FORK_LEN;
        let mut c = reply_of(w.freeze());
        c.read_u16().unwrap(); // consume the echoed bitmap, as callers do
        let info = ForkInfo::decode(&mut c, bitmap).unwrap();
        assert_eq!(info.data_fork_len, Some(12345));
    }

    #[test]
    fn volume_info_resolves_offset_based_name_field() {
        let mut w = Writer::new();
        // VOL_ID at fixed position, NAME as an offset pointing past it.
        w.put_u16(7); // volume id
        w.put_u16(6); // name offset, relative to record base (0)
        w.put_pascal(b"data");
        let bitmap = VolBitmap::VOL_ID | VolBitmap::NAME;
        let mut c = reply_of(w.freeze());
        let info = VolumeInfo::decode(&mut c, bitmap).unwrap();
        assert_eq!(info.volume_id, Some(7));
        assert_eq!(&info.name.unwrap()[..], b"data");
    }

    #[test]
    fn file_dir_info_switches_bitmap_by_directory_flag() {
        let mut w = Writer::new();
        w.put_u32(99); // NODE_ID (dir bitmap)
        let mut c = reply_of(w.freeze());
        let info = FileDirInfo::decode(&mut c, FileBitmap::empty(), DirBitmap::NODE_ID, true).unwrap();
        assert!(info.is_directory);
        assert_eq!(info.node_id, Some(99));
    }
}
