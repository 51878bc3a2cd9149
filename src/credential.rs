//! The external collaborator `Server`'s interactive login retry loop talks
//! to: prompting, keyring lookup, and keyring save. The core defines the
//! contract; a host embeds it (GNOME Keyring, a CLI prompt, a test double).

use async_trait::async_trait;

use crate::error::Error;

/// What to do with a password once login succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    Never,
    Session,
    Permanent,
}

/// A password obtained from the user, with enough context to retry or persist it.
#[derive(Debug, Clone)]
pub struct PasswordAnswer {
    pub user: Option<String>,
    pub password: String,
    pub anonymous: bool,
    pub save: SavePolicy,
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Prompt the user for credentials. `initial_user`, if present, is shown
    /// as a pre-filled suggestion. Returns `Err(Error::Cancelled)` if the
    /// user declines.
    async fn ask_password(
        &self,
        prompt: &str,
        initial_user: Option<&str>,
    ) -> Result<PasswordAnswer, Error>;

    /// Look up a previously saved password for `(user, host, proto, port)`,
    /// if one exists.
    async fn lookup(&self, user: &str, host: &str, proto: &str, port: u16) -> Option<(Option<String>, Option<String>)>;

    /// Persist a password per `policy`. A no-op store may simply drop this.
    async fn save(&self, user: &str, host: &str, proto: &str, port: u16, password: &str, policy: SavePolicy);
}
