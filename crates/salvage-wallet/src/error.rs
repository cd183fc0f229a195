//! Wallet error types.

use salvage_core::error::{CodecError, CryptoError};
use thiserror::Error;

/// The first required backup field found missing or mistyped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupDefect {
    #[error("Token missing.")]
    Token,
    #[error("Export details missing.")]
    Export,
    #[error("Backup version missing.")]
    Version,
    #[error("Backup timestamp missing.")]
    Timestamp,
    #[error("Chain private key missing.")]
    ChainPrivateKey,
}

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The backup file is not valid JSON.
    #[error("Backup was malformed.")]
    MalformedBackup,

    /// A backup entry lacks a required field. `wallet` is 1-based.
    #[error("Wallet #{wallet} was malformed: {defect}")]
    MalformedWallet {
        /// Position of the entry in the backup, starting at 1.
        wallet: usize,
        /// What was missing.
        defect: BackupDefect,
    },

    /// The backup has no entry for the requested asset.
    #[error("no {0} wallet in backup")]
    AssetNotInBackup(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Key or address encoding error from salvage-core.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Cryptographic error from salvage-core.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<std::io::Error> for WalletError {
    fn from(e: std::io::Error) -> Self {
        WalletError::IoError(e.to_string())
    }
}
