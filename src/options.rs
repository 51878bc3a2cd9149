//! Connection parameters, mirroring `tf-provider`'s `ConnectionSshConfig`:
//! a plain serializable struct instead of loose function arguments.

use serde::{Deserialize, Serialize};

/// Which UAM family to prefer when more than one is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UamPreference {
    /// Prefer anonymous login ("No User Authent").
    Anonymous,
    /// Prefer DHX (DHCAST128) with the supplied username/password.
    Dhx,
    /// The server's "DHX2" UAM: recognized during UAM-list parsing but its
    /// (SHA-based) handshake is not implemented, so selecting it fails
    /// immediately with `Error::Unsupported` rather than silently falling
    /// back to a different mechanism.
    Dhx2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub uam: UamPreference,
    pub initial_user: Option<String>,
    /// §7: "the core does not log except under a host-supplied debug flag" —
    /// the host installs a `tracing` filter when this is set, the core never
    /// consults it directly.
    #[serde(default)]
    pub debug: bool,
}

impl ConnectOptions {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
