//! Shared fixtures for integration tests.

use bitcoin::opcodes::all::OP_NOP;
use bitcoin::script::{Builder, PushBytesBuf};

use salvage_core::hash::{hash160, sha256};
use salvage_core::{AddressCodec, AssetKind, ChainKeyState, ChainSecret};
use salvage_escrow::session::SessionConfig;
use salvage_wallet::{DerivedAddress, GenerationConfig, WalletBackup};

/// Root secret `0x00…01`.
pub const ROOT_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";

pub const FEED_HEADER: &str =
    "crypto,addressIdentifier,txid,vout,value,escrowModel,revealedPayload,redeemScript,witnessScript";

/// 64-hex secret filled with `byte`.
pub fn secret_hex(byte: u8) -> String {
    hex::encode([byte; 32])
}

/// One backup wallet record.
pub fn backup_record(token: &str, root_hex: &str, escrow_root_hex: Option<&str>) -> String {
    let escrow = escrow_root_hex
        .map(|e| format!(r#","script_escrow_keys":"{e}""#))
        .unwrap_or_default();
    format!(
        r#"{{"token":"{token}","export":{{"wallet_version":"2.1","timestamp":1600000000}},"chain_private_key":"{root_hex}"{escrow}}}"#
    )
}

/// Backup holding every UTXO asset plus ETH, all on `root_hex`.
pub fn backup_json(root_hex: &str, escrow_root_hex: Option<&str>) -> String {
    let records: Vec<String> = AssetKind::ALL
        .iter()
        .map(|a| backup_record(a.ticker(), root_hex, escrow_root_hex))
        .collect();
    format!("[{}]", records.join(","))
}

pub fn backup(root_hex: &str, escrow_root_hex: Option<&str>) -> WalletBackup {
    WalletBackup::parse(&backup_json(root_hex, escrow_root_hex)).unwrap()
}

/// Derived address `index` of `root_hex` for `asset`.
pub fn key_at(asset: AssetKind, root_hex: &str, index: usize) -> DerivedAddress {
    let mut state = ChainKeyState::new(ChainSecret::from_hex(root_hex).unwrap());
    let (i, key) = state.take(index + 1).unwrap().pop().unwrap();
    DerivedAddress::derive(&AddressCodec::new(), asset, i, key)
}

/// The hash an escrow script commits to for `key`: the compressed key hash
/// on segwit chains, the address identifier elsewhere.
pub fn escrow_pkh(asset: AssetKind, key: &DerivedAddress) -> [u8; 20] {
    if asset.is_segwit() {
        let pk = AddressCodec::new().public_key(&key.private_key).unwrap();
        hash160(&pk.serialize())
    } else {
        *key.identifier.unwrap().as_bytes()
    }
}

/// Script of `len` tokens with the given pushes and `OP_NOP` elsewhere.
pub fn template(len: usize, pushes: &[(usize, Vec<u8>)]) -> Vec<u8> {
    let mut b = Builder::new();
    for i in 0..len {
        b = match pushes.iter().find(|(pos, _)| *pos == i) {
            Some((_, bytes)) => b.push_slice(PushBytesBuf::try_from(bytes.clone()).unwrap()),
            None => b.push_opcode(OP_NOP),
        };
    }
    b.into_script().into_bytes()
}

pub fn commit_reveal_script(
    buyer_pkh: [u8; 20],
    seller_release_hash: [u8; 20],
    seller_pkh: [u8; 20],
    buyer_release_hash: [u8; 20],
) -> Vec<u8> {
    template(
        32,
        &[
            (5, buyer_pkh.to_vec()),
            (6, seller_release_hash.to_vec()),
            (21, seller_pkh.to_vec()),
            (22, buyer_release_hash.to_vec()),
        ],
    )
}

pub fn checkdatasig_script(
    seller_pkh: [u8; 20],
    buyer_pkh: [u8; 20],
    arbitrator_pkh: [u8; 20],
    escrow_key: [u8; 32],
) -> Vec<u8> {
    template(
        40,
        &[
            (4, seller_pkh.to_vec()),
            (5, buyer_pkh.to_vec()),
            (11, arbitrator_pkh.to_vec()),
            (31, escrow_key.to_vec()),
        ],
    )
}

/// P2SH-P2WSH redeem script wrapping `witness_script`.
pub fn p2sh_p2wsh_redeem(witness_script: &[u8]) -> Vec<u8> {
    let mut redeem = vec![0x00, 0x20];
    redeem.extend(sha256(witness_script));
    redeem
}

/// One feed row.
#[derive(Debug, Clone)]
pub struct FeedRow {
    pub crypto: String,
    pub identifier: String,
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub model: String,
    pub payload: String,
    pub redeem_script: Vec<u8>,
    pub witness_script: Option<Vec<u8>>,
}

impl FeedRow {
    pub fn line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{}",
            self.crypto,
            self.identifier,
            self.txid,
            self.vout,
            self.value,
            self.model,
            self.payload,
            hex::encode(&self.redeem_script),
            self.witness_script.as_ref().map(hex::encode).unwrap_or_default()
        )
    }
}

pub fn feed_csv(rows: &[FeedRow]) -> String {
    let mut lines = vec![FEED_HEADER.to_string()];
    lines.extend(rows.iter().map(FeedRow::line));
    lines.join("\n")
}

/// Session settings small enough for tests.
pub fn test_session_config(scan_depth: usize) -> SessionConfig {
    SessionConfig {
        scan_depth,
        min_feed_rows: 1,
        generation: GenerationConfig::default(),
    }
}
