//! Wallet backup file parsing.
//!
//! A backup is a JSON array of per-asset wallets:
//!
//! ```json
//! [{ "token": "BTC",
//!    "export": { "wallet_version": "2.1", "timestamp": 1600000000 },
//!    "chain_private_key": "<64 hex>",
//!    "script_escrow_keys": "<64 hex>" }]
//! ```
//!
//! Older exports hold a single object instead of an array. Validation
//! reports the first missing field of the first bad wallet, numbered
//! from 1.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use salvage_core::{AssetKind, ChainSecret};

use crate::error::{BackupDefect, WalletError};

/// One validated wallet record, with its token kept verbatim.
///
/// Records whose token is not a supported asset are retained so that the
/// backup round-trips, but [`WalletBackup::entry`] never returns them.
/// The secret strings are wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BackupRecord {
    #[zeroize(skip)]
    pub token: String,
    #[zeroize(skip)]
    pub wallet_version: String,
    #[zeroize(skip)]
    pub timestamp: i64,
    chain_private_key: String,
    script_escrow_keys: Option<String>,
}

impl std::fmt::Debug for BackupRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupRecord")
            .field("token", &self.token)
            .field("wallet_version", &self.wallet_version)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Typed wallet entry for a supported asset.
#[derive(Debug, Clone)]
pub struct WalletBackupEntry {
    pub asset: AssetKind,
    pub root_secret: ChainSecret,
    pub script_escrow_root: Option<ChainSecret>,
    pub wallet_version: String,
    pub timestamp: i64,
}

impl WalletBackupEntry {
    /// Build an entry directly from a root secret (tests and tooling).
    pub fn new(asset: AssetKind, root_secret: ChainSecret) -> Self {
        Self {
            asset,
            root_secret,
            script_escrow_root: None,
            wallet_version: String::new(),
            timestamp: 0,
        }
    }

    /// Export time of the backup, if the timestamp is representable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// A parsed and validated backup file.
#[derive(Debug, Clone)]
pub struct WalletBackup {
    records: Vec<BackupRecord>,
}

impl WalletBackup {
    /// Parse and validate backup JSON.
    pub fn parse(text: &str) -> Result<Self, WalletError> {
        let file: BackupFile =
            serde_json::from_str(text).map_err(|_| WalletError::MalformedBackup)?;
        let wallets = match file {
            BackupFile::Wallets(items) => items,
            BackupFile::Single(single) => vec![single],
        };

        let records = wallets
            .into_iter()
            .enumerate()
            .map(|(i, wallet)| {
                // A wallet that is not even an object reports its first field.
                let raw = serde_json::from_value(wallet).unwrap_or_default();
                validate_record(raw).map_err(|defect| WalletError::MalformedWallet {
                    wallet: i + 1,
                    defect,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(wallets = records.len(), "backup: parsed");
        Ok(Self { records })
    }

    /// Read and parse a backup file from disk.
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    /// Supported assets present in the backup, in file order.
    pub fn assets(&self) -> Vec<AssetKind> {
        self.records
            .iter()
            .filter_map(|r| AssetKind::from_ticker(&r.token).ok())
            .collect()
    }

    /// Wallet version of the first record.
    pub fn wallet_version(&self) -> Option<&str> {
        self.records.first().map(|r| r.wallet_version.as_str())
    }

    /// Export time of the first record.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.records
            .first()
            .and_then(|r| DateTime::from_timestamp(r.timestamp, 0))
    }

    /// Typed entry for `asset`. Fails if the asset is absent or its
    /// secrets are not 32-byte hex strings.
    pub fn entry(&self, asset: AssetKind) -> Result<WalletBackupEntry, WalletError> {
        let record = self
            .records
            .iter()
            .find(|r| r.token == asset.ticker())
            .ok_or_else(|| WalletError::AssetNotInBackup(asset.ticker().to_string()))?;

        let root_secret = ChainSecret::from_hex(&record.chain_private_key)?;
        let script_escrow_root = record
            .script_escrow_keys
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(ChainSecret::from_hex)
            .transpose()?;

        Ok(WalletBackupEntry {
            asset,
            root_secret,
            script_escrow_root,
            wallet_version: record.wallet_version.clone(),
            timestamp: record.timestamp,
        })
    }

    /// Root of the commit-reveal escrow key search.
    ///
    /// Always read from the BTC wallet, whichever asset is being swept.
    pub fn script_escrow_root(&self) -> Result<Option<ChainSecret>, WalletError> {
        match self.entry(AssetKind::Btc) {
            Ok(entry) => Ok(entry.script_escrow_root.clone()),
            Err(WalletError::AssetNotInBackup(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Top level of a backup file: current exports are a list, older ones a
/// single wallet object.
#[derive(Deserialize)]
#[serde(untagged)]
enum BackupFile {
    Wallets(Vec<Value>),
    Single(Value),
}

/// One wallet as written. Every field is optional and a mistyped value
/// reads as absent, so validation can name the first defect.
#[derive(Default, Deserialize, Zeroize, ZeroizeOnDrop)]
struct RawWallet {
    #[serde(default, deserialize_with = "lenient")]
    #[zeroize(skip)]
    token: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    #[zeroize(skip)]
    export: Option<RawExport>,
    #[serde(default, deserialize_with = "lenient")]
    chain_private_key: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    script_escrow_keys: Option<String>,
}

#[derive(Default, Deserialize)]
struct RawExport {
    #[serde(default, deserialize_with = "lenient")]
    wallet_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<i64>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Any JSON number is accepted; fractional seconds are truncated.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)))
}

fn validate_record(mut wallet: RawWallet) -> Result<BackupRecord, BackupDefect> {
    let token = wallet.token.take().ok_or(BackupDefect::Token)?;
    let export = wallet.export.take().ok_or(BackupDefect::Export)?;
    let wallet_version = export.wallet_version.ok_or(BackupDefect::Version)?;
    let timestamp = export.timestamp.ok_or(BackupDefect::Timestamp)?;
    let chain_private_key = wallet
        .chain_private_key
        .take()
        .ok_or(BackupDefect::ChainPrivateKey)?;

    Ok(BackupRecord {
        token,
        wallet_version,
        timestamp,
        chain_private_key,
        script_escrow_keys: wallet.script_escrow_keys.take(),
    })
}
