//! Session-level operations: status query (`GET_STATUS`), the interactive
//! login retry loop, volume listing (`GetSrvrParms`), and logout. Grounded
//! in `gvfsafpserver.c`.

pub mod dhx;

use std::collections::HashSet;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::codec::{Cursor, SeekFrom};
use crate::command::{AfpCommandType, Command};
use crate::connection::{Connection, PendingConnection};
use crate::credential::{CredentialSource, SavePolicy};
use crate::dsi::{DsiFlags, DsiHeader, DsiOpcode, HEADER_LEN};
use crate::error::Error;
use crate::options::{ConnectOptions, UamPreference};
use crate::result::AfpResultCode;

/// The anonymous UAM name, `gvfsafpserver.c`'s `AFP_UAM_NO_USER` — note the
/// embedded space, which must survive verbatim on the wire.
pub const UAM_NO_USER: &str = "No User Authent";
/// Recognized but unimplemented: its handshake is SHA-based, not DHX's.
pub const UAM_DHX2: &str = "DHX2";

/// 2000-01-01 00:00:00 UTC in Unix epoch seconds, the anchor every AFP
/// timestamp (a signed second offset) is relative to.
pub const AFP_EPOCH_UNIX_SECONDS: i64 = 946_684_800;

/// AFP dialect versions, ordered so picking the highest one a server
/// advertises is a plain `max`. Strings per `gvfsafpserver.c`'s
/// `afp_version_to_string`/`string_to_afp_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AfpVersion {
    Afpx03 = 1,
    Afp31 = 2,
    Afp32 = 3,
    Afp33 = 4,
}

impl AfpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Afpx03 => "AFPX03",
            Self::Afp31 => "AFP3.1",
            Self::Afp32 => "AFP3.2",
            Self::Afp33 => "AFP3.3",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "AFPX03" => Some(Self::Afpx03),
            "AFP3.1" => Some(Self::Afp31),
            "AFP3.2" => Some(Self::Afp32),
            "AFP3.3" => Some(Self::Afp33),
            _ => None,
        }
    }
}

/// The parsed `GET_STATUS` reply: everything needed to pick a version, pick
/// a UAM, and label the session before any login attempt.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub flags: u16,
    pub server_name: String,
    pub machine_type: String,
    pub version: AfpVersion,
    pub uams: HashSet<String>,
}

impl ServerInfo {
    /// Open a *separate* short-lived TCP connection and issue
    /// `DSI_GET_STATUS` directly — no `DSI_OPEN_SESSION` handshake, per
    /// `g_vfs_afp_server_login`'s own call to `get_server_info`.
    pub async fn fetch(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let mut stream = TcpStream::connect(addr).await?;

        let header = DsiHeader {
            flags: DsiFlags::Request,
            command: DsiOpcode::GetStatus,
            request_id: 0,
            error_or_offset: 0,
            total_data_length: 0,
            reserved: 0,
        };
        stream.write_all(&header.encode_bytes()).await?;

        let mut header_buf = [0u8; HEADER_LEN];
        stream.read_exact(&mut header_buf).await?;
        let reply_header = DsiHeader::decode_bytes(header_buf)?;
        let mut payload_buf = vec![0u8; reply_header.total_data_length as usize];
        stream.read_exact(&mut payload_buf).await?;

        Self::parse(Bytes::from(payload_buf))
    }

    /// Decode the `GET_STATUS` reply body: three leading offsets (machine
    /// type, AFP version list, UAM list — a fourth, the volume icon/mask
    /// offset, is read and discarded), then `flags:u16` and an inline
    /// `serverName:pascal`, then three separate seek-and-parse passes.
    fn parse(payload: Bytes) -> Result<Self, Error> {
        let mut c = Cursor::new(payload);
        let machine_type_offset = c.read_u16()?;
        let afp_version_count_offset = c.read_u16()?;
        let uam_count_offset = c.read_u16()?;
        let _volume_icon_and_mask_offset = c.read_u16()?;
        let flags = c.read_u16()?;
        let server_name = c.read_pascal()?;

        c.seek(machine_type_offset as i64, SeekFrom::Start)?;
        let machine_type = c.read_pascal()?;

        c.seek(afp_version_count_offset as i64, SeekFrom::Start)?;
        let version_count = c.read_u8()?;
        let mut version = None;
        for _ in 0..version_count {
            let raw = c.read_pascal()?;
            if let Some(v) = AfpVersion::from_str(&String::from_utf8_lossy(&raw)) {
                version = Some(match version {
                    Some(cur) => std::cmp::max(cur, v),
                    None => v,
                });
            }
        }
        let version = version
            .ok_or_else(|| Error::unsupported("server advertises no recognized AFP version"))?;

        c.seek(uam_count_offset as i64, SeekFrom::Start)?;
        let uam_count = c.read_u8()?;
        let mut uams = HashSet::with_capacity(uam_count as usize);
        for _ in 0..uam_count {
            let raw = c.read_pascal()?;
            uams.insert(String::from_utf8_lossy(&raw).into_owned());
        }

        Ok(Self {
            flags,
            server_name: String::from_utf8_lossy(&server_name).into_owned(),
            machine_type: String::from_utf8_lossy(&machine_type).into_owned(),
            version,
            uams,
        })
    }
}

/// One entry of a `GetSrvrParms` listing.
#[derive(Debug, Clone)]
pub struct VolumeListing {
    pub name: String,
    pub has_password: bool,
    pub is_default: bool,
}

fn parse_volume_listings(reply: &mut crate::reply::Reply) -> Result<Vec<VolumeListing>, Error> {
    let _server_time = reply.read_i32()?;
    let count = reply.read_u8()?;
    let mut volumes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let flags = reply.read_u8()?;
        let name = reply.read_pascal()?;
        volumes.push(VolumeListing {
            name: String::from_utf8_lossy(&name).into_owned(),
            has_password: flags & 0x01 != 0,
            is_default: flags & 0x02 != 0,
        });
    }
    Ok(volumes)
}

/// An authenticated AFP session: a live multiplexed `Connection` plus the
/// server metadata `GET_STATUS` reported before login.
pub struct Server {
    connection: Connection,
    info: ServerInfo,
}

impl Server {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn version(&self) -> AfpVersion {
        self.info.version
    }

    pub fn server_name(&self) -> &str {
        &self.info.server_name
    }

    pub fn machine_type(&self) -> &str {
        &self.info.machine_type
    }

    /// Drive `g_vfs_afp_server_login`'s retry loop: fetch server info once,
    /// then either log in anonymously or try (keyring lookup, then prompts)
    /// until a non-`PermissionDenied` outcome.
    pub async fn login(
        opts: &ConnectOptions,
        credentials: &dyn CredentialSource,
    ) -> Result<Self, Error> {
        let info = ServerInfo::fetch(opts.address()).await?;

        if matches!(opts.uam, UamPreference::Dhx2) {
            return Err(Error::unsupported(
                "DHX2 UAM is recognized but not implemented",
            ));
        }

        let wants_anonymous = matches!(opts.uam, UamPreference::Anonymous)
            || opts.initial_user.as_deref() == Some("anonymous");
        if wants_anonymous {
            return Self::login_anonymous_session(opts, info).await;
        }

        if !info.uams.contains(dhx::UAM_NAME) {
            return Err(Error::NoAuthMechanism);
        }

        let mut user = opts.initial_user.clone().unwrap_or_default();
        let mut password: Option<String> = None;
        if !user.is_empty() {
            if let Some((_, Some(looked_up))) =
                credentials.lookup(&user, &opts.host, "afp", opts.port).await
            {
                password = Some(looked_up);
            }
        }

        loop {
            let (pw, save) = match password.take() {
                Some(pw) => (pw, SavePolicy::Never),
                None => {
                    let answer = credentials
                        .ask_password("Enter password", Some(user.as_str()))
                        .await?;
                    if answer.anonymous {
                        return Self::login_anonymous_session(opts, info).await;
                    }
                    if let Some(answered_user) = answer.user {
                        user = answered_user;
                    }
                    (answer.password, answer.save)
                }
            };

            let mut conn = PendingConnection::open(opts.address()).await?;
            match dhx::login(&mut conn, info.version.as_str(), &user, &pw).await {
                Ok(()) => {
                    if !matches!(save, SavePolicy::Never) {
                        credentials
                            .save(&user, &opts.host, "afp", opts.port, &pw, save)
                            .await;
                    }
                    return Ok(Self {
                        connection: conn.into_connection(),
                        info,
                    });
                }
                Err(Error::PermissionDenied) => continue,
                Err(other) => return Err(other),
            }
        }
    }

    async fn login_anonymous_session(
        opts: &ConnectOptions,
        info: ServerInfo,
    ) -> Result<Self, Error> {
        if !info.uams.contains(UAM_NO_USER) {
            return Err(Error::NoAuthMechanism);
        }
        let mut conn = PendingConnection::open(opts.address()).await?;
        login_anonymous(&mut conn, info.version.as_str()).await?;
        Ok(Self {
            connection: conn.into_connection(),
            info,
        })
    }

    /// `GetSrvrParms` (AFP command 16): the volumes visible to this session.
    /// Session-scoped, not a `Volume` operation.
    pub async fn list_volumes(&self) -> Result<Vec<VolumeListing>, Error> {
        let mut cmd = Command::new(AfpCommandType::GetSrvrParms);
        cmd.put_pad();
        let mut reply = self.connection.send(cmd).await?;
        reply.ok_or_else(|code| Error::failed(code, "GetSrvrParms failed"))?;
        parse_volume_listings(&mut reply)
    }

    /// Convert an AFP-epoch second offset (as returned in e.g. `CREATE_DATE`)
    /// into Unix epoch seconds.
    pub fn time_to_local(afp_time: i32) -> i64 {
        AFP_EPOCH_UNIX_SECONDS + afp_time as i64
    }

    /// Issue `DSI_CLOSE_SESSION` and tear down the multiplexer task.
    /// Idempotent, matching `Connection::close`.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Build a `Server` around an already-live `Connection`, skipping
    /// `GET_STATUS`/login entirely. Used by `volume`'s integration tests,
    /// which drive a fake DSI peer directly.
    #[cfg(test)]
    pub(crate) fn for_test(connection: Connection, version: AfpVersion) -> Self {
        Self {
            connection,
            info: ServerInfo {
                flags: 0,
                server_name: "test-server".to_string(),
                machine_type: "test".to_string(),
                version,
                uams: HashSet::new(),
            },
        }
    }
}

/// `LOGIN` with exactly two Pascal fields (version, UAM name) and no binary
/// payload — unlike DHX, there is no `pad_to_even` and no trailing bytes.
async fn login_anonymous(conn: &mut PendingConnection, version: &str) -> Result<(), Error> {
    let mut cmd = Command::new(AfpCommandType::Login);
    cmd.put_pascal(version.as_bytes());
    cmd.put_pascal(UAM_NO_USER.as_bytes());
    conn.send_command_sync(cmd).await?;
    let reply = conn.read_reply_sync().await?;
    match reply.result_code() {
        AfpResultCode::NoError => Ok(()),
        AfpResultCode::UserNotAuth => Err(Error::PermissionDenied),
        other => Err(Error::failed(other, "anonymous login failed")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Writer;

    #[test]
    fn afp_version_orders_by_recency() {
        assert!(AfpVersion::Afp33 > AfpVersion::Afp32);
        assert!(AfpVersion::Afp32 > AfpVersion::Afp31);
        assert!(AfpVersion::Afp31 > AfpVersion::Afpx03);
    }

    #[test]
    fn afp_version_strings_round_trip() {
        for v in [
            AfpVersion::Afpx03,
            AfpVersion::Afp31,
            AfpVersion::Afp32,
            AfpVersion::Afp33,
        ] {
            assert_eq!(AfpVersion::from_str(v.as_str()), Some(v));
        }
        assert_eq!(AfpVersion::from_str("bogus"), None);
    }

    #[test]
    fn time_to_local_anchors_on_the_afp_epoch() {
        assert_eq!(Server::time_to_local(0), AFP_EPOCH_UNIX_SECONDS);
        assert_eq!(Server::time_to_local(86_400), AFP_EPOCH_UNIX_SECONDS + 86_400);
    }

    #[test]
    fn server_info_parses_offsets_and_picks_the_highest_version() {
        // Layout: 4 leading u16 offsets, flags, inline server name, then the
        // three seek targets in whatever order we choose to place them.
        let mut w = Writer::new();
        // Offsets are filled in once we know where each section lands.
        let header_len = 2 + 2 + 2 + 2 + 2; // four offsets + flags
        let server_name_len = 1 + 3; // pascal "srv"
        let machine_type_offset = (header_len + server_name_len) as u16;
        let machine_type_len = 1 + 4; // pascal "mac1"
        let version_count_offset = machine_type_offset + machine_type_len as u16;
        // two versions: "AFP3.1" (7 bytes) and "AFP3.3" (7 bytes)
        let version_section_len = 1 + 7 + 7;
        let uam_count_offset = version_count_offset + version_section_len as u16;

        w.put_u16(machine_type_offset);
        w.put_u16(version_count_offset);
        w.put_u16(uam_count_offset);
        w.put_u16(0); // volume icon/mask offset, ignored
        w.put_u16(0x8000); // flags
        w.put_pascal(b"srv");
        w.put_pascal(b"mac1");
        w.put_u8(2);
        w.put_pascal(b"AFP3.1");
        w.put_pascal(b"AFP3.3");
        w.put_u8(1);
        w.put_pascal(dhx::UAM_NAME.as_bytes());

        let info = ServerInfo::parse(w.freeze()).unwrap();
        assert_eq!(info.server_name, "srv");
        assert_eq!(info.machine_type, "mac1");
        assert_eq!(info.version, AfpVersion::Afp33);
        assert!(info.uams.contains(dhx::UAM_NAME));
    }

    #[test]
    fn volume_listings_decode_flags_and_names() {
        let mut w = Writer::new();
        w.put_i32(0); // server time, discarded
        w.put_u8(2);
        w.put_u8(0x03); // has_password | is_default
        w.put_pascal(b"Macintosh HD");
        w.put_u8(0x00);
        w.put_pascal(b"Backups");
        let mut reply = crate::reply::Reply::new(AfpResultCode::NoError, w.freeze());
        let volumes = parse_volume_listings(&mut reply).unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].name, "Macintosh HD");
        assert!(volumes[0].has_password);
        assert!(volumes[0].is_default);
        assert_eq!(volumes[1].name, "Backups");
        assert!(!volumes[1].has_password);
    }
}
