//! Supported chain assets and their network parameters.
//!
//! Every per-asset decision in the workspace is an exhaustive `match` on
//! [`AssetKind`], so adding or removing an asset is a compile-time change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// A chain asset that can appear in a wallet backup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// Bitcoin (nested segwit addresses).
    Btc,
    /// Litecoin (nested segwit addresses).
    Ltc,
    /// Dash (legacy P2PKH addresses).
    Dash,
    /// Bitcoin Cash (CashAddr P2PKH, uncompressed keys).
    Bch,
    /// Ethereum (Keccak addresses, no WIF).
    Eth,
}

/// Base58 and bech32 parameters of a UTXO chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainParams {
    /// Version byte of legacy pay-to-pubkey-hash addresses.
    pub pubkey_hash_version: u8,
    /// Version byte of pay-to-script-hash addresses.
    pub script_hash_version: u8,
    /// Version byte of WIF private keys.
    pub wif_version: u8,
    /// Human-readable part of native segwit addresses, if the chain has one.
    pub bech32_hrp: Option<&'static str>,
    /// Whether wallet keys are serialized in compressed form.
    pub compressed_keys: bool,
}

const BTC_PARAMS: ChainParams = ChainParams {
    pubkey_hash_version: 0x00,
    script_hash_version: 0x05,
    wif_version: 0x80,
    bech32_hrp: Some("bc"),
    compressed_keys: true,
};

const LTC_PARAMS: ChainParams = ChainParams {
    pubkey_hash_version: 0x30,
    script_hash_version: 0x32,
    wif_version: 0xB0,
    bech32_hrp: Some("ltc"),
    compressed_keys: true,
};

const DASH_PARAMS: ChainParams = ChainParams {
    pubkey_hash_version: 0x4C,
    script_hash_version: 0x10,
    wif_version: 0xCC,
    bech32_hrp: None,
    compressed_keys: true,
};

const BCH_PARAMS: ChainParams = ChainParams {
    pubkey_hash_version: 0x00,
    script_hash_version: 0x05,
    wif_version: 0x80,
    bech32_hrp: None,
    compressed_keys: false,
};

impl AssetKind {
    /// All supported assets, in backup order.
    pub const ALL: [AssetKind; 5] = [
        AssetKind::Btc,
        AssetKind::Ltc,
        AssetKind::Dash,
        AssetKind::Bch,
        AssetKind::Eth,
    ];

    /// Ticker used in backups and the escrow feed (`BTC`, `LTC`, ...).
    pub fn ticker(&self) -> &'static str {
        match self {
            AssetKind::Btc => "BTC",
            AssetKind::Ltc => "LTC",
            AssetKind::Dash => "DASH",
            AssetKind::Bch => "BCH",
            AssetKind::Eth => "ETH",
        }
    }

    /// Look up an asset by ticker (case-sensitive, as stored in backups).
    pub fn from_ticker(ticker: &str) -> Result<Self, CodecError> {
        match ticker {
            "BTC" => Ok(AssetKind::Btc),
            "LTC" => Ok(AssetKind::Ltc),
            "DASH" => Ok(AssetKind::Dash),
            "BCH" => Ok(AssetKind::Bch),
            "ETH" => Ok(AssetKind::Eth),
            other => Err(CodecError::UnsupportedAsset(other.to_string())),
        }
    }

    /// Whether escrow outputs on this chain are spent through a witness.
    pub fn is_segwit(&self) -> bool {
        match self {
            AssetKind::Btc | AssetKind::Ltc => true,
            AssetKind::Dash | AssetKind::Bch | AssetKind::Eth => false,
        }
    }

    /// UTXO chain parameters, `None` for account-based chains.
    pub fn params(&self) -> Option<&'static ChainParams> {
        match self {
            AssetKind::Btc => Some(&BTC_PARAMS),
            AssetKind::Ltc => Some(&LTC_PARAMS),
            AssetKind::Dash => Some(&DASH_PARAMS),
            AssetKind::Bch => Some(&BCH_PARAMS),
            AssetKind::Eth => None,
        }
    }

    /// Like [`params`](Self::params) but fails for account-based chains.
    pub fn utxo_params(&self) -> Result<&'static ChainParams, CodecError> {
        self.params()
            .ok_or_else(|| CodecError::UnsupportedAsset(self.ticker().to_string()))
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for AssetKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_ticker(s)
    }
}
