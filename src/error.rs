//! The error taxonomy shared by every layer of the client.

use crate::result::AfpResultCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection closed before a reply arrived")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    TransportError(#[from] std::io::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("short read: reply ended before the expected field")]
    ShortRead,

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("not found")]
    NotFound,

    #[error("is a directory")]
    IsDirectory,

    #[error("not a directory")]
    NotDirectory,

    #[error("already exists")]
    Exists,

    #[error("directory not empty")]
    NotEmpty,

    #[error("busy")]
    Busy,

    #[error("too many files open")]
    TooManyOpen,

    #[error("disk full")]
    NoSpace,

    #[error("invalid filename")]
    InvalidFilename,

    #[error("operation would recurse into itself")]
    WouldRecurse,

    #[error("operation not supported by this server")]
    NotSupported,

    #[error("login failed")]
    LoginFailed,

    #[error("no acceptable authentication mechanism")]
    NoAuthMechanism,

    #[error("{message} (AFP error {code})")]
    Failed { code: i32, message: String },
}

impl Error {
    /// Residual fallback for an AFP result code with no operation-specific mapping.
    pub fn failed(code: AfpResultCode, message: impl Into<String>) -> Self {
        Self::Failed {
            code: code.raw(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::TransportError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "operation timed out",
        ))
    }
}
