//! Wallet Import Format: `base58check(version ‖ key ‖ [0x01 if compressed])`.

use crate::error::CodecError;
use crate::ratchet::RawPrivateKey;

/// Suffix byte marking a key whose public key is used in compressed form.
const COMPRESSED_FLAG: u8 = 0x01;

/// A decoded WIF string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWif {
    pub version: u8,
    pub key: RawPrivateKey,
    pub compressed: bool,
}

/// Serialize a private key as WIF.
pub fn encode(version: u8, key: &RawPrivateKey, compressed: bool) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(version);
    payload.extend_from_slice(key.as_bytes());
    if compressed {
        payload.push(COMPRESSED_FLAG);
    }
    let encoded = bs58::encode(&payload).with_check().into_string();
    zeroize::Zeroize::zeroize(&mut payload);
    encoded
}

/// Parse a WIF string back into version, key and compression flag.
pub fn decode(s: &str) -> Result<DecodedWif, CodecError> {
    let mut payload = bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|e| CodecError::InvalidWif(e.to_string()))?;
    let compressed = match payload.len() {
        33 => false,
        34 if payload[33] == COMPRESSED_FLAG => true,
        34 => return Err(CodecError::InvalidWif("bad compression flag".into())),
        n => return Err(CodecError::InvalidWif(format!("unexpected length {n}"))),
    };
    let mut key = [0u8; 32];
    key.copy_from_slice(&payload[1..33]);
    let version = payload[0];
    zeroize::Zeroize::zeroize(&mut payload);
    Ok(DecodedWif {
        version,
        key: RawPrivateKey::from_bytes(key),
        compressed,
    })
}
