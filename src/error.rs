// src/error.rs

//! Error types for the module runtime
//!
//! Every failure carries a human-readable message. Callers that need to
//! branch on the failure class use [`Error::kind`] instead of matching
//! individual variants.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Failure class used for propagation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Identity or artifact confirmed absent
    NotFound,
    /// Transient fetch, network or filesystem failure
    SyncFailed,
    /// The artifact could not be turned into a tunnel
    InvalidArtifact,
    /// A required store is not configured
    NotConfigured,
    /// Shape validation rejected an input
    InvalidIdentity,
    /// A tunnel refused to initialize or was used after close
    Lifecycle,
    /// Configuration file could not be read or parsed
    Config,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sync failed: {0}")]
    SyncFailed(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Invalid handle type: {0}")]
    InvalidHandleType(String),

    #[error("Failed to load artifact: {0}")]
    LoadFailed(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Module {name} failed to initialize: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("Module {0} is closed")]
    Closed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::SyncFailed(_) | Self::IoError(_) => ErrorKind::SyncFailed,
            Self::SymbolNotFound(_) | Self::InvalidHandleType(_) | Self::LoadFailed(_) => {
                ErrorKind::InvalidArtifact
            }
            Self::NotConfigured(_) => ErrorKind::NotConfigured,
            Self::InvalidIdentity(_) => ErrorKind::InvalidIdentity,
            Self::InitFailed { .. } | Self::Closed(_) => ErrorKind::Lifecycle,
            Self::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Whether this error means "confirmed absent"
    ///
    /// Only this class is eligible for version fallback.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}
