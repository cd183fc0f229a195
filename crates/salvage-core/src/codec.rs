//! Per-asset address and private-key encoding.
//!
//! [`AddressCodec::encode`] turns a ratchet leaf key into the address shown
//! to the user, the serialized private key used for export, and the 20-byte
//! hash the escrow feed indexes outputs by.
//!
//! | Asset | Address                          | Serialized key             |
//! |-------|----------------------------------|----------------------------|
//! | BTC   | P2WPKH-in-P2SH (`3...`)          | `p2wpkh-p2sh:` + WIF       |
//! | LTC   | P2WPKH-in-P2SH (`M...`)          | `p2wpkh-p2sh:` + WIF       |
//! | DASH  | P2PKH (`X...`)                   | `p2pkh:` + WIF             |
//! | BCH   | CashAddr P2PKH, uncompressed key | `p2pkh:` + uncompressed WIF|
//! | ETH   | `0x` + Keccak-256 tail           | raw hex                    |

use std::fmt;

use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};

use crate::asset::AssetKind;
use crate::base58;
use crate::cashaddr::{CashAddr, CashAddrKind};
use crate::constants::{IDENTIFIER_VERSION, P2PKH_TAG, P2WPKH_P2SH_TAG};
use crate::error::{AddressError, CodecError, CryptoError};
use crate::hash::{hash160, keccak256};
use crate::ratchet::RawPrivateKey;
use crate::wif;

/// The 20-byte hash an address commits to.
///
/// P2SH script hash for nested-segwit assets, public key hash for legacy
/// P2PKH assets. On the feed wire it is written as `"00" ‖ hex(hash)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressIdentifier([u8; 20]);

impl AddressIdentifier {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Feed representation: version tag `00` followed by the hash in hex.
    pub fn to_feed_hex(&self) -> String {
        let mut out = hex::encode([IDENTIFIER_VERSION]);
        out.push_str(&hex::encode(self.0));
        out
    }

    /// Parse the feed representation. The version tag must be `00`.
    pub fn from_feed_hex(s: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(s.trim()).map_err(|_| AddressError::InvalidLength)?;
        let (&version, hash) = bytes.split_first().ok_or(AddressError::InvalidLength)?;
        if version != IDENTIFIER_VERSION {
            return Err(AddressError::InvalidVersion(version));
        }
        let hash: [u8; 20] = hash.try_into().map_err(|_| AddressError::InvalidLength)?;
        Ok(Self(hash))
    }
}

impl fmt::Display for AddressIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_feed_hex())
    }
}

impl fmt::Debug for AddressIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressIdentifier({})", self.to_feed_hex())
    }
}

/// Result of encoding one private key for one asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedAddress {
    /// Address as displayed to the user.
    pub address: String,
    /// Private key in the asset's export format.
    pub serialized_private_key: String,
    /// Hash committed by the address; `None` for account-based chains.
    pub identifier: Option<AddressIdentifier>,
}

/// Address encoder holding a reusable secp256k1 context.
pub struct AddressCodec {
    secp: Secp256k1<All>,
}

impl Default for AddressCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AddressCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressCodec").finish_non_exhaustive()
    }
}

impl AddressCodec {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// The underlying signing/verification context.
    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// Interpret a leaf key as a secp256k1 secret key.
    pub fn secret_key(key: &RawPrivateKey) -> Result<SecretKey, CryptoError> {
        SecretKey::from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidPrivateKey)
    }

    pub fn public_key(&self, key: &RawPrivateKey) -> Result<PublicKey, CryptoError> {
        let sk = Self::secret_key(key)?;
        Ok(PublicKey::from_secret_key(&self.secp, &sk))
    }

    /// Public key bytes in the form the asset's wallets use
    /// (compressed except for BCH).
    pub fn wallet_public_key(
        &self,
        asset: AssetKind,
        key: &RawPrivateKey,
    ) -> Result<Vec<u8>, CodecError> {
        let pk = self.public_key(key)?;
        let params = asset.utxo_params()?;
        Ok(if params.compressed_keys {
            pk.serialize().to_vec()
        } else {
            pk.serialize_uncompressed().to_vec()
        })
    }

    /// Encode `key` for `asset`.
    pub fn encode(
        &self,
        asset: AssetKind,
        key: &RawPrivateKey,
    ) -> Result<EncodedAddress, CodecError> {
        let pk = self.public_key(key)?;
        match asset {
            AssetKind::Eth => {
                let digest = keccak256(&pk.serialize_uncompressed()[1..]);
                Ok(EncodedAddress {
                    address: format!("0x{}", hex::encode(&digest[12..])),
                    serialized_private_key: Self::serialize_private_key(asset, key),
                    identifier: None,
                })
            }
            AssetKind::Btc | AssetKind::Ltc => {
                let params = asset.utxo_params()?;
                let script_hash = hash160(&p2wpkh_redeem_script(&pk));
                Ok(EncodedAddress {
                    address: base58::encode_address(params.script_hash_version, &script_hash),
                    serialized_private_key: Self::serialize_private_key(asset, key),
                    identifier: Some(AddressIdentifier(script_hash)),
                })
            }
            AssetKind::Dash => {
                let params = asset.utxo_params()?;
                let pubkey_hash = hash160(&pk.serialize());
                Ok(EncodedAddress {
                    address: base58::encode_address(params.pubkey_hash_version, &pubkey_hash),
                    serialized_private_key: Self::serialize_private_key(asset, key),
                    identifier: Some(AddressIdentifier(pubkey_hash)),
                })
            }
            AssetKind::Bch => {
                let params = asset.utxo_params()?;
                let pubkey_hash = hash160(&pk.serialize_uncompressed());
                Ok(EncodedAddress {
                    address: CashAddr::new(CashAddrKind::P2pkh, pubkey_hash).encode(),
                    serialized_private_key: Self::serialize_private_key(asset, key),
                    identifier: Some(AddressIdentifier(pubkey_hash)),
                })
            }
        }
    }

    /// Export form of a private key. Needs no public key, so it also
    /// works for keys that are not valid scalars.
    pub fn serialize_private_key(asset: AssetKind, key: &RawPrivateKey) -> String {
        match asset.params() {
            None => key.to_hex(),
            Some(params) => {
                let tag = if asset.is_segwit() {
                    P2WPKH_P2SH_TAG
                } else {
                    P2PKH_TAG
                };
                format!("{tag}:{}", wif::encode(params.wif_version, key, params.compressed_keys))
            }
        }
    }

    /// Inverse of [`serialize_private_key`](Self::serialize_private_key).
    ///
    /// Checks the codec tag, WIF version and compression flag against the
    /// asset.
    pub fn parse_serialized_key(asset: AssetKind, s: &str) -> Result<RawPrivateKey, CodecError> {
        let s = s.trim();
        if asset == AssetKind::Eth {
            let raw = s.strip_prefix("0x").unwrap_or(s);
            return Ok(RawPrivateKey::from_hex(raw)?);
        }
        let params = asset.utxo_params()?;
        let expected_tag = if asset.is_segwit() {
            P2WPKH_P2SH_TAG
        } else {
            P2PKH_TAG
        };
        let body = match s.split_once(':') {
            Some((tag, body)) if tag == expected_tag => body,
            Some((tag, _)) => return Err(CodecError::InvalidWif(format!("unexpected tag {tag}"))),
            None => s,
        };
        let decoded = wif::decode(body)?;
        if decoded.version != params.wif_version {
            return Err(CodecError::InvalidWif(format!(
                "version {:#04x} is not {asset}",
                decoded.version
            )));
        }
        if decoded.compressed != params.compressed_keys {
            return Err(CodecError::InvalidWif("compression flag mismatch".into()));
        }
        Ok(decoded.key)
    }
}

/// `OP_0 <hash160(compressed pubkey)>`, the redeem script of a nested
/// P2WPKH output.
fn p2wpkh_redeem_script(pk: &PublicKey) -> [u8; 22] {
    let mut script = [0u8; 22];
    script[0] = 0x00;
    script[1] = 0x14;
    script[2..].copy_from_slice(&hash160(&pk.serialize()));
    script
}
