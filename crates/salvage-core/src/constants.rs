//! Fixed protocol values shared by the recovery pipeline.

/// HMAC message producing the leaf private key from a chain secret.
pub const LEAF_KEY_TAG: [u8; 2] = [0x00, 0x01];

/// HMAC message producing the next chain secret.
pub const NEXT_SECRET_TAG: [u8; 1] = [0x02];

/// Size of every ratchet secret and leaf key in bytes.
pub const SECRET_LEN: usize = 32;

/// Version tag prepended (as hex `00`) to the 20-byte address hash in the
/// escrow feed's `addressIdentifier` column.
pub const IDENTIFIER_VERSION: u8 = 0x00;

/// CashAddr prefix for Bitcoin Cash mainnet.
pub const CASHADDR_PREFIX: &str = "bitcoincash";

/// Codec tag for nested-segwit serialized keys.
pub const P2WPKH_P2SH_TAG: &str = "p2wpkh-p2sh";

/// Codec tag for legacy pay-to-pubkey-hash serialized keys.
pub const P2PKH_TAG: &str = "p2pkh";
