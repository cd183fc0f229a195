//! # salvage-core
//! Key ratchet, hashing primitives and per-chain address codecs.

pub mod asset;
pub mod base58;
pub mod cashaddr;
pub mod codec;
pub mod constants;
pub mod error;
pub mod hash;
pub mod ratchet;
pub mod wif;

pub use asset::{AssetKind, ChainParams};
pub use codec::{AddressCodec, AddressIdentifier, EncodedAddress};
pub use error::{AddressError, CodecError, CryptoError};
pub use ratchet::{ChainKeyState, ChainSecret, RawPrivateKey};
