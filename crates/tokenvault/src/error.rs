//! Error types for TokenVault.
//!
//! All errors are strongly typed and propagated without panicking.
//! Bearer token values are never included in `Unauthorized` messages.

/// Vault error types covering registry, object store, and gate operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Corrupt document: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// True for lookup misses, including a missing backing file.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, VaultError>;
