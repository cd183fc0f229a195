//! BIP143 signature digest with an explicit sighash type.
//!
//! `bitcoin`'s sighash cache only accepts the standard sighash flags.
//! Bitcoin Cash signs every input with `SIGHASH_ALL | SIGHASH_FORKID`
//! (`0x41`) over the same BIP143 preimage, so the digest is assembled here
//! from consensus-encoded parts.

use bitcoin::consensus::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Amount, Script, Transaction};

use crate::error::SweepError;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ALL_FORKID: u32 = SIGHASH_ALL | SIGHASH_FORKID;

const SIGHASH_BASE_MASK: u32 = 0x1f;
const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// BIP143 digest of input `vin` spending `value` locked by `script_code`.
///
/// Only the `ALL` base type is supported, with or without `FORKID`.
pub fn bip143_digest(
    tx: &Transaction,
    vin: usize,
    script_code: &Script,
    value: Amount,
    sighash_type: u32,
) -> Result<[u8; 32], SweepError> {
    if sighash_type & SIGHASH_BASE_MASK != SIGHASH_ALL || sighash_type & SIGHASH_ANYONECANPAY != 0
    {
        return Err(SweepError::InvalidInput(format!(
            "unsupported sighash type {sighash_type:#04x}"
        )));
    }
    let input = tx.input.get(vin).ok_or_else(|| {
        SweepError::InvalidInput(format!("input {vin} out of range ({} inputs)", tx.input.len()))
    })?;

    let mut prevouts = Vec::with_capacity(36 * tx.input.len());
    let mut sequences = Vec::with_capacity(4 * tx.input.len());
    for txin in &tx.input {
        prevouts.extend(serialize(&txin.previous_output));
        sequences.extend(serialize(&txin.sequence));
    }
    let mut outputs = Vec::new();
    for txout in &tx.output {
        outputs.extend(serialize(txout));
    }

    let mut preimage = Vec::with_capacity(156 + script_code.len());
    preimage.extend(tx.version.0.to_le_bytes());
    preimage.extend(sha256d::Hash::hash(&prevouts).to_byte_array());
    preimage.extend(sha256d::Hash::hash(&sequences).to_byte_array());
    preimage.extend(serialize(&input.previous_output));
    preimage.extend(serialize(&script_code.to_owned()));
    preimage.extend(value.to_sat().to_le_bytes());
    preimage.extend(serialize(&input.sequence));
    preimage.extend(sha256d::Hash::hash(&outputs).to_byte_array());
    preimage.extend(tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend(sighash_type.to_le_bytes());

    Ok(sha256d::Hash::hash(&preimage).to_byte_array())
}
