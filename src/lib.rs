//! An AFP (Apple Filing Protocol) client core: DSI transport multiplexing,
//! DHX session authentication, and a per-volume filesystem API.
//!
//! A host embeds this crate by supplying a [`credential::CredentialSource`],
//! calling [`server::Server::login`], then mounting volumes with
//! [`volume::Volume::mount`]. The crate never prompts, logs to stderr, or
//! reads configuration itself — those are the host's job, matching the
//! separation `tf-provider` draws between its core and its CLI/provider shell.

mod bitmap;
mod codec;
mod command;
mod connection;
pub mod credential;
mod dsi;
mod error;
mod name;
pub mod options;
mod reply;
mod result;
pub mod server;
pub mod volume;

pub use bitmap::{AfpAccessMode, AfpPathType, DirBitmap, FileBitmap, FileDirAttributesBitmap, VolAttributes, VolBitmap};
pub use codec::SeekFrom;
pub use command::{AfpCommandType, Command};
pub use connection::{Connection, PendingConnection};
pub use dsi::{DsiFlags, DsiHeader, DsiOpcode};
pub use error::Error;
pub use name::AfpName;
pub use reply::Reply;
pub use result::AfpResultCode;

pub use credential::{CredentialSource, PasswordAnswer, SavePolicy};
pub use options::{ConnectOptions, UamPreference};
pub use server::{AfpVersion, Server, ServerInfo, VolumeListing};
pub use volume::info::{ForkInfo, FileDirInfo, UnixPrivs, VolumeInfo};
pub use volume::{ForkRef, Volume};
