//! # salvage-escrow
//! Recovering funds locked in escrow scripts.
//!
//! # Modules
//!
//! - [`error`]: `EscrowError`, `FeedError`, `SweepError`, `SessionError`
//! - [`feed`]: escrow UTXO CSV feed
//! - [`script`]: redeem/witness script decoding and party detection
//! - [`settlement`]: settlement authorization tokens
//! - [`sighash`]: BIP143 digest with arbitrary sighash flags
//! - [`sweep`]: sweep transaction assembly, fee balancing and signing
//! - [`session`]: the four-stage sweep workflow

pub mod error;
pub mod feed;
pub mod script;
pub mod session;
pub mod settlement;
pub mod sighash;
pub mod sweep;

pub use error::{EscrowError, FeedError, SessionError, SweepError};
pub use feed::{EscrowModel, EscrowUtxo, FeedSource};
pub use script::{EscrowTerms, Party};
pub use session::{SessionConfig, Stage, StageStatus, SweepSession};
pub use settlement::{Action, SettlementToken};
pub use sweep::{Normalized, SignedSweep, SweepInput, SweepPlan};
