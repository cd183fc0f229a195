//! Error types for key derivation and address encoding.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid HMAC key length")] InvalidMacKey,
    #[error("invalid secret length: expected 32 bytes, got {0}")] InvalidSecretLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("private key is not a valid secp256k1 scalar")] InvalidPrivateKey,
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid prefix: {0}")] InvalidPrefix(String),
    #[error("invalid length")] InvalidLength,
    #[error("invalid checksum")] InvalidChecksum,
    #[error("invalid character: {0}")] InvalidCharacter(char),
    #[error("invalid version: {0:#04x}")] InvalidVersion(u8),
    #[error("invalid padding bits")] InvalidPadding,
    #[error("mixed case")] MixedCase,
    #[error("base58: {0}")] Base58(String),
    #[error("unsupported address for {asset}: {address}")]
    Unsupported { asset: String, address: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported asset: {0}")] UnsupportedAsset(String),
    #[error("invalid WIF: {0}")] InvalidWif(String),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Address(#[from] AddressError),
}
