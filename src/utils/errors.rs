//! Custom error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Backup rejected: {0}")]
    Rejected(RejectReason),
}

/// Why a trigger did not turn into a running job. Rejections are expected
/// outcomes, logged at low severity, never treated as failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("another backup is already in progress")]
    AlreadyRunning,

    #[error("backups are disabled")]
    Disabled,

    #[error("server is empty and this is not the last backup before idle")]
    ServerEmpty,

    #[error("every connected user has the bypass capability")]
    AllUsersBypass,
}

/// Non-fatal configuration problem. Parsers return these instead of logging
/// so the fallback behavior stays testable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    #[error("unknown time unit '{0}', interpreting the amount as minutes")]
    UnknownTimeUnit(char),

    #[error("unknown size unit '{0}', interpreting the amount as bytes")]
    UnknownSizeUnit(char),

    #[error("unparsable interval setting '{0}', automatic backups disabled")]
    UnparsableInterval(String),

    #[error("unparsable backup limit '{0}', retention disabled")]
    UnparsableLimit(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
