//! One-way chain key ratchet.
//!
//! A wallet backup stores a single 32-byte root secret per asset. Every
//! address key is re-derived from it by walking a HMAC-SHA256 chain:
//!
//! ```text
//! leaf(n)      = HMAC-SHA256(key = secret(n), msg = 0x0001)
//! secret(n+1)  = HMAC-SHA256(key = secret(n), msg = 0x02)
//! ```
//!
//! The chain cannot be walked backwards, so resuming at an earlier index
//! means restarting from the root. [`ChainKeyState`] is the resumable
//! cursor; it never re-derives from index 0 between batches.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{LEAF_KEY_TAG, NEXT_SECRET_TAG, SECRET_LEN};
use crate::error::CryptoError;
use crate::hash::hmac_sha256;

/// A chain secret (either the backup root or a later ratchet state).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChainSecret([u8; SECRET_LEN]);

impl ChainSecret {
    /// Wrap raw secret bytes.
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded 32-byte secret as stored in backups.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        Ok(Self(decode_secret_hex(hex_str)?))
    }

    /// Raw secret bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for ChainSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChainSecret([REDACTED])")
    }
}

/// A leaf private key produced by the ratchet.
///
/// Not guaranteed to be a valid secp256k1 scalar; the address codec
/// performs that check.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RawPrivateKey([u8; SECRET_LEN]);

impl RawPrivateKey {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        Ok(Self(decode_secret_hex(hex_str)?))
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Lowercase hex encoding (the ETH export format).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RawPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawPrivateKey([REDACTED])")
    }
}

fn decode_secret_hex(hex_str: &str) -> Result<[u8; SECRET_LEN], CryptoError> {
    let bytes = hex::decode(hex_str.trim()).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidSecretLength(len))
}

/// Private key exposed at the step whose chain state is `secret`.
pub fn derive_leaf_key(secret: &ChainSecret) -> Result<RawPrivateKey, CryptoError> {
    hmac_sha256(secret.as_bytes(), &LEAF_KEY_TAG).map(RawPrivateKey)
}

/// Chain state following `secret`.
pub fn derive_next_secret(secret: &ChainSecret) -> Result<ChainSecret, CryptoError> {
    hmac_sha256(secret.as_bytes(), &NEXT_SECRET_TAG).map(ChainSecret)
}

/// Resumable ratchet cursor: the secret at `index` and the index itself.
///
/// Advances monotonically; the only way back is [`ChainKeyState::new`]
/// with the root secret.
pub struct ChainKeyState {
    current: ChainSecret,
    index: u64,
}

impl ChainKeyState {
    /// Start a fresh chain at index 0.
    pub fn new(root: ChainSecret) -> Self {
        Self {
            current: root,
            index: 0,
        }
    }

    /// Index of the key that the next [`step`](Self::step) returns.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Derive the key at the current index and advance the cursor.
    ///
    /// On error the cursor is left untouched.
    pub fn step(&mut self) -> Result<(u64, RawPrivateKey), CryptoError> {
        let key = derive_leaf_key(&self.current)?;
        let next = derive_next_secret(&self.current)?;
        let index = self.index;
        self.current = next;
        self.index += 1;
        Ok((index, key))
    }

    /// Derive `count` consecutive keys.
    pub fn take(&mut self, count: usize) -> Result<Vec<(u64, RawPrivateKey)>, CryptoError> {
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(self.step()?);
        }
        Ok(keys)
    }
}

impl fmt::Debug for ChainKeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainKeyState")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
