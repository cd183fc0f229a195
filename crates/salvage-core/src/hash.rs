//! Hash primitives: SHA-256, HASH160, HMAC-SHA256 and Keccak-256.

use bitcoin::hashes::{Hash, hash160};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// RIPEMD-160 of SHA-256, the hash committed by P2PKH/P2SH outputs.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

/// HMAC-SHA256 over `data` keyed with `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Keccak-256 (pre-standard SHA-3 padding), used for Ethereum addresses.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}
