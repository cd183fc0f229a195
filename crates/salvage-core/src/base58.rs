//! Base58Check legacy addresses (`version ‖ hash160`).

use crate::error::AddressError;

/// Encode a 20-byte hash with a one-byte version as Base58Check.
pub fn encode_address(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}

/// Decode a Base58Check address into its version byte and 20-byte hash.
pub fn decode_address(s: &str) -> Result<(u8, [u8; 20]), AddressError> {
    let payload = bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|e| AddressError::Base58(e.to_string()))?;
    if payload.len() != 21 {
        return Err(AddressError::InvalidLength);
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((payload[0], hash))
}
