//! CashAddr encoding for Bitcoin Cash.
//!
//! Addresses have the form `prefix:payload` where the payload is a base32
//! string of `version ‖ hash160` followed by a 40-bit BCH checksum over the
//! prefix and payload. Only 160-bit hashes (size code 0) are supported,
//! which covers every P2PKH and P2SH address.

use std::fmt;
use std::str::FromStr;

use crate::constants::CASHADDR_PREFIX;
use crate::error::AddressError;

/// Base32 character set shared with bech32.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Number of 5-bit checksum groups.
const CHECKSUM_LEN: usize = 8;

/// Output type encoded in the version byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CashAddrKind {
    P2pkh,
    P2sh,
}

impl CashAddrKind {
    fn type_bits(&self) -> u8 {
        match self {
            CashAddrKind::P2pkh => 0,
            CashAddrKind::P2sh => 1,
        }
    }

    fn from_type_bits(bits: u8) -> Result<Self, AddressError> {
        match bits {
            0 => Ok(CashAddrKind::P2pkh),
            1 => Ok(CashAddrKind::P2sh),
            other => Err(AddressError::InvalidVersion(other << 3)),
        }
    }
}

/// A decoded CashAddr.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CashAddr {
    prefix: String,
    kind: CashAddrKind,
    hash: [u8; 20],
}

impl CashAddr {
    /// Mainnet address for a 20-byte hash.
    pub fn new(kind: CashAddrKind, hash: [u8; 20]) -> Self {
        Self {
            prefix: CASHADDR_PREFIX.to_string(),
            kind,
            hash,
        }
    }

    pub fn kind(&self) -> CashAddrKind {
        self.kind
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encode as `prefix:payload` (always lowercase).
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(21);
        raw.push(self.kind.type_bits() << 3);
        raw.extend_from_slice(&self.hash);
        // 21 bytes always convert cleanly with padding.
        let payload = convert_bits(&raw, 8, 5, true).unwrap_or_default();
        let checksum = create_checksum(&self.prefix, &payload);

        let mut out = String::with_capacity(self.prefix.len() + 1 + payload.len() + CHECKSUM_LEN);
        out.push_str(&self.prefix);
        out.push(':');
        for &d in payload.iter().chain(checksum.iter()) {
            out.push(CHARSET[d as usize] as char);
        }
        out
    }

    /// Decode a CashAddr; a missing prefix is taken to be `bitcoincash`.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper {
            return Err(AddressError::MixedCase);
        }
        let lower = s.trim().to_ascii_lowercase();

        let (prefix, data_part) = match lower.rfind(':') {
            Some(pos) => (&lower[..pos], &lower[pos + 1..]),
            None => (CASHADDR_PREFIX, lower.as_str()),
        };
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(AddressError::InvalidPrefix(prefix.to_string()));
        }
        if data_part.len() <= CHECKSUM_LEN {
            return Err(AddressError::InvalidLength);
        }

        let mut data = Vec::with_capacity(data_part.len());
        for c in data_part.chars() {
            let pos = CHARSET
                .iter()
                .position(|&ch| ch as char == c)
                .ok_or(AddressError::InvalidCharacter(c))?;
            data.push(pos as u8);
        }

        if !verify_checksum(prefix, &data) {
            return Err(AddressError::InvalidChecksum);
        }

        let payload = &data[..data.len() - CHECKSUM_LEN];
        let raw = convert_bits(payload, 5, 8, false).ok_or(AddressError::InvalidPadding)?;
        let (&version, hash_bytes) = raw.split_first().ok_or(AddressError::InvalidLength)?;

        // Size code 0 = 160-bit hash; the high bit is reserved.
        if version & 0x87 != 0 {
            return Err(AddressError::InvalidVersion(version));
        }
        let kind = CashAddrKind::from_type_bits(version >> 3)?;
        let hash: [u8; 20] = hash_bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength)?;

        Ok(Self {
            prefix: prefix.to_string(),
            kind,
            hash,
        })
    }
}

impl fmt::Display for CashAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for CashAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

// --- Checksum internals ---

/// CashAddr polymod over 5-bit values (40-bit BCH code).
fn polymod(values: &[u8]) -> u64 {
    const GEN: [u64; 5] = [
        0x98f2bc8e61,
        0x79b76d99e2,
        0xf33e5fb3c4,
        0xae2eabe2a8,
        0x1e4f43e470,
    ];
    let mut c: u64 = 1;
    for &v in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(v);
        for (i, &g) in GEN.iter().enumerate() {
            if (c0 >> i) & 1 != 0 {
                c ^= g;
            }
        }
    }
    c ^ 1
}

/// Lower five bits of each prefix character followed by a zero separator.
fn prefix_expand(prefix: &str) -> Vec<u8> {
    let mut ret: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    ret.push(0);
    ret
}

fn create_checksum(prefix: &str, payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut values = prefix_expand(prefix);
    values.extend_from_slice(payload);
    values.extend_from_slice(&[0u8; CHECKSUM_LEN]);
    let pm = polymod(&values);
    let mut out = [0u8; CHECKSUM_LEN];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ((pm >> (5 * (CHECKSUM_LEN - 1 - i))) & 0x1f) as u8;
    }
    out
}

fn verify_checksum(prefix: &str, data: &[u8]) -> bool {
    let mut values = prefix_expand(prefix);
    values.extend_from_slice(data);
    polymod(&values) == 0
}

/// Convert between bit widths (8-bit bytes to 5-bit groups and back).
fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut ret = Vec::new();
    let maxv = (1u32 << to_bits) - 1;
    for &value in data {
        let v = u32::from(value);
        if v >> from_bits != 0 {
            return None;
        }
        acc = (acc << from_bits) | v;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return None;
    }
    Some(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR_HASH: &str = "f5bf48b397dae70be82b3cca4793f8eb2b6cdac9";
    const VECTOR_ADDR: &str = "bitcoincash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2";

    fn vector_hash() -> [u8; 20] {
        hex::decode(VECTOR_HASH).unwrap().try_into().unwrap()
    }

    #[test]
    fn encode_reference_vector() {
        let addr = CashAddr::new(CashAddrKind::P2pkh, vector_hash());
        assert_eq!(addr.encode(), VECTOR_ADDR);
    }

    #[test]
    fn decode_reference_vector() {
        let addr = CashAddr::decode(VECTOR_ADDR).unwrap();
        assert_eq!(addr.kind(), CashAddrKind::P2pkh);
        assert_eq!(addr.hash(), &vector_hash());
        assert_eq!(addr.prefix(), "bitcoincash");
    }

    #[test]
    fn decode_without_prefix() {
        let bare = VECTOR_ADDR.trim_start_matches("bitcoincash:");
        assert_eq!(CashAddr::decode(bare).unwrap().hash(), &vector_hash());
    }

    #[test]
    fn decode_uppercase() {
        let upper = VECTOR_ADDR.to_ascii_uppercase();
        assert_eq!(CashAddr::decode(&upper).unwrap().hash(), &vector_hash());
    }

    #[test]
    fn decode_mixed_case_rejected() {
        let mut mixed = VECTOR_ADDR.to_string();
        mixed.replace_range(12..13, "R");
        assert_eq!(CashAddr::decode(&mixed).unwrap_err(), AddressError::MixedCase);
    }

    #[test]
    fn p2sh_roundtrip() {
        let addr = CashAddr::new(CashAddrKind::P2sh, [0x11; 20]);
        let encoded = addr.encode();
        assert!(encoded.starts_with("bitcoincash:p"));
        assert_eq!(CashAddr::decode(&encoded).unwrap(), addr);
    }

    #[test]
    fn p2pkh_starts_with_q() {
        let encoded = CashAddr::new(CashAddrKind::P2pkh, [0x22; 20]).encode();
        assert!(encoded.starts_with("bitcoincash:q"));
        assert_eq!(encoded, encoded.to_ascii_lowercase());
    }

    #[test]
    fn bad_checksum_rejected() {
        let mut s = VECTOR_ADDR.to_string();
        s.pop();
        s.push('3');
        assert_eq!(CashAddr::decode(&s).unwrap_err(), AddressError::InvalidChecksum);
    }

    #[test]
    fn invalid_character_rejected() {
        let s = "bitcoincash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekgb";
        assert_eq!(
            CashAddr::decode(s).unwrap_err(),
            AddressError::InvalidCharacter('b')
        );
    }

    #[test]
    fn wrong_prefix_fails_checksum() {
        let s = VECTOR_ADDR.replace("bitcoincash", "bchtest");
        assert_eq!(CashAddr::decode(&s).unwrap_err(), AddressError::InvalidChecksum);
    }

    #[test]
    fn legacy_address_is_not_cashaddr() {
        assert!(CashAddr::decode("1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu").is_err());
    }
}
