//! # salvage-wallet
//! Backup loading and address generation.
//!
//! Reads a wallet backup file, then re-derives its addresses on demand
//! through a resumable chain key ratchet.
//!
//! # Modules
//!
//! - [`error`]: `WalletError` enum
//! - [`backup`]: JSON backup parsing and validation
//! - [`address_book`]: incremental, searchable, exportable address list

pub mod address_book;
pub mod backup;
pub mod error;

pub use address_book::{AddressBook, DerivedAddress, GenerationConfig, GenerationOutcome};
pub use backup::{WalletBackup, WalletBackupEntry};
pub use error::WalletError;
