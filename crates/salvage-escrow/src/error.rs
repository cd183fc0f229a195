//! Escrow error types.

use salvage_core::error::{CodecError, CryptoError};
use salvage_wallet::WalletError;
use thiserror::Error;

use crate::session::Stage;

/// Errors from script decoding and settlement authorization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("unhandled escrow model: {0}")]
    UnknownModel(String),

    /// Script too short, undecodable, or a push of the wrong size.
    #[error("malformed escrow script: {0}")]
    MalformedScript(String),

    /// The recovered key is neither the buyer nor the seller.
    #[error("wallet key is not a party to this escrow")]
    NotAParty,

    #[error("script_escrow_keys missing from backup")]
    MissingEscrowRoot,

    #[error("could not find escrow key in {searched} candidates")]
    EscrowKeyNotFound { searched: u32 },

    /// A settlement token failed to parse or verify.
    #[error("invalid settlement token: {0}")]
    InvalidToken(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// Errors from loading the escrow UTXO feed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The download returned an error page or too little data.
    #[error("Error downloading CSV file.")]
    Unavailable,

    /// `line` is 1-based and counts the header.
    #[error("malformed feed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for FeedError {
    fn from(e: std::io::Error) -> Self {
        FeedError::IoError(e.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        FeedError::Http(e.to_string())
    }
}

/// Errors from building and signing a sweep transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    #[error("no inputs selected")]
    NoInputs,

    /// Only inputs with a settlement payload can be swept.
    #[error("input {txid}:{vout} has no settlement payload")]
    MissingPayload { txid: String, vout: u32 },

    #[error("input {txid}:{vout} has no witness script")]
    MissingWitnessScript { txid: String, vout: u32 },

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The re-signed transaction no longer has the size its fee was
    /// computed from.
    #[error("signed size {signed} vB differs from measured {measured} vB")]
    SizeChanged { measured: usize, signed: usize },

    #[error("amount overflow")]
    Overflow,

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors from driving a [`crate::SweepSession`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("stage not available: {0}")]
    StageUnavailable(Stage),

    #[error("no escrow UTXO at position {0}")]
    NoSuchUtxo(usize),

    /// Selection requires a settlement payload.
    #[error("escrow UTXO at position {0} has no settlement payload")]
    NotSelectable(usize),

    #[error("network fee rate not set")]
    MissingFeeRate,

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Sweep(#[from] SweepError),
}
