//! Settlement authorization tokens.
//!
//! An escrow can only be spent with the counterparty's consent. Consent is
//! a colon-separated token handed over out of band:
//!
//! - `checkdatasig_v1`: `action:uncompressedPubKeyHex:derSignatureHex`,
//!   a signature over `SHA256(actionByte ‖ escrowKey)`
//! - `commit_reveal_v1`: `action:preimageHex`, the 32-byte release code
//!   whose HASH160 is committed in the script
//!
//! Commit-reveal release codes are `SHA256(root ‖ decimal(i))` for a
//! per-user root stored in the BTC backup; the index `i` is not stored, so
//! it is recovered by search.

use std::fmt;
use std::str::FromStr;

use bitcoin::secp256k1::{ecdsa::Signature, Message, PublicKey};
use tracing::{debug, info};

use salvage_core::hash::{hash160, sha256};
use salvage_core::{AddressCodec, ChainSecret, RawPrivateKey};

use crate::error::EscrowError;
use crate::feed::EscrowModel;
use crate::script::{EscrowTerms, Party};

/// Upper bound on the release-code index search.
pub const ESCROW_KEY_SEARCH_LIMIT: u32 = 50_000;

/// Settlement outcome, encoded as a single byte in escrow scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ReleaseBySeller,
    ReleaseByArbitrator,
    ReturnByBuyer,
    ReturnByArbitrator,
}

impl Action {
    pub fn as_byte(&self) -> u8 {
        match self {
            Action::ReleaseBySeller => 0x01,
            Action::ReleaseByArbitrator => 0x02,
            Action::ReturnByBuyer => 0x03,
            Action::ReturnByArbitrator => 0x04,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ReleaseBySeller => "release_by_seller",
            Action::ReleaseByArbitrator => "release_by_arbitrator",
            Action::ReturnByBuyer => "return_by_buyer",
            Action::ReturnByArbitrator => "return_by_arbitrator",
        }
    }

    /// The action a party authorizes for the other side.
    fn granted_by(party: Party) -> Result<Self, EscrowError> {
        match party {
            Party::Seller => Ok(Action::ReleaseBySeller),
            Party::Buyer => Ok(Action::ReturnByBuyer),
            Party::Unknown => Err(EscrowError::NotAParty),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release_by_seller" => Ok(Action::ReleaseBySeller),
            "release_by_arbitrator" => Ok(Action::ReleaseByArbitrator),
            "return_by_buyer" => Ok(Action::ReturnByBuyer),
            "return_by_arbitrator" => Ok(Action::ReturnByArbitrator),
            other => Err(EscrowError::InvalidToken(format!("unknown action {other:?}"))),
        }
    }
}

/// A parsed settlement token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementToken {
    CheckDataSig {
        action: Action,
        /// Revealer's public key, exactly as it will be pushed.
        public_key: Vec<u8>,
        /// Strict DER, no sighash byte.
        signature: Vec<u8>,
    },
    CommitReveal {
        action: Action,
        preimage: [u8; 32],
    },
}

impl SettlementToken {
    /// Parse and shape-check a token for `model`.
    pub fn parse(model: &EscrowModel, text: &str) -> Result<Self, EscrowError> {
        model.ensure_known()?;
        let parts: Vec<&str> = text.trim().split(':').collect();
        match model {
            EscrowModel::CheckDataSigV1 => {
                let [action, public_key, signature] = parts.as_slice() else {
                    return Err(EscrowError::InvalidToken(format!(
                        "expected 3 fields, got {}",
                        parts.len()
                    )));
                };
                let public_key = decode_hex("public key", public_key)?;
                PublicKey::from_slice(&public_key)
                    .map_err(|e| EscrowError::InvalidToken(format!("public key: {e}")))?;
                let signature = decode_hex("signature", signature)?;
                Signature::from_der(&signature)
                    .map_err(|e| EscrowError::InvalidToken(format!("signature: {e}")))?;
                Ok(SettlementToken::CheckDataSig {
                    action: action.parse()?,
                    public_key,
                    signature,
                })
            }
            EscrowModel::CommitRevealV1 => {
                let [action, preimage] = parts.as_slice() else {
                    return Err(EscrowError::InvalidToken(format!(
                        "expected 2 fields, got {}",
                        parts.len()
                    )));
                };
                let bytes = decode_hex("preimage", preimage)?;
                let preimage: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    EscrowError::InvalidToken(format!(
                        "preimage must be 32 bytes, got {}",
                        bytes.len()
                    ))
                })?;
                Ok(SettlementToken::CommitReveal {
                    action: action.parse()?,
                    preimage,
                })
            }
            EscrowModel::Unknown(name) => Err(EscrowError::UnknownModel(name.clone())),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            SettlementToken::CheckDataSig { action, .. }
            | SettlementToken::CommitReveal { action, .. } => *action,
        }
    }

    /// Check that the token would satisfy the script described by `terms`.
    pub fn verify(&self, codec: &AddressCodec, terms: &EscrowTerms) -> Result<(), EscrowError> {
        match (self, terms) {
            (
                SettlementToken::CheckDataSig {
                    action,
                    public_key,
                    signature,
                },
                EscrowTerms::CheckDataSig {
                    seller_pkh,
                    buyer_pkh,
                    arbitrator_pkh,
                    escrow_key,
                    ..
                },
            ) => {
                let signer = hash160(public_key);
                if ![seller_pkh, buyer_pkh, arbitrator_pkh].contains(&&signer) {
                    return Err(EscrowError::InvalidToken(
                        "public key does not belong to this escrow".into(),
                    ));
                }
                let pk = PublicKey::from_slice(public_key)
                    .map_err(|e| EscrowError::InvalidToken(format!("public key: {e}")))?;
                let sig = Signature::from_der(signature)
                    .map_err(|e| EscrowError::InvalidToken(format!("signature: {e}")))?;
                let msg = Message::from_digest(settlement_digest(*action, escrow_key));
                codec
                    .secp()
                    .verify_ecdsa(&msg, &sig, &pk)
                    .map_err(|_| EscrowError::InvalidToken("signature does not verify".into()))
            }
            (
                SettlementToken::CommitReveal { action, preimage },
                EscrowTerms::CommitReveal {
                    seller_release_hash,
                    buyer_release_hash,
                    ..
                },
            ) => {
                let target = match action {
                    Action::ReleaseBySeller => seller_release_hash,
                    Action::ReturnByBuyer => buyer_release_hash,
                    other => {
                        return Err(EscrowError::InvalidToken(format!(
                            "{other} cannot be revealed by a release code"
                        )));
                    }
                };
                if &hash160(preimage) == target {
                    Ok(())
                } else {
                    Err(EscrowError::InvalidToken("preimage does not match".into()))
                }
            }
            _ => Err(EscrowError::InvalidToken(format!(
                "token is not for a {} escrow",
                terms.model()
            ))),
        }
    }
}

impl fmt::Display for SettlementToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementToken::CheckDataSig {
                action,
                public_key,
                signature,
            } => write!(f, "{action}:{}:{}", hex::encode(public_key), hex::encode(signature)),
            SettlementToken::CommitReveal { action, preimage } => {
                write!(f, "{action}:{}", hex::encode(preimage))
            }
        }
    }
}

fn decode_hex(field: &str, s: &str) -> Result<Vec<u8>, EscrowError> {
    hex::decode(s).map_err(|e| EscrowError::InvalidToken(format!("{field}: {e}")))
}

/// `SHA256(actionByte ‖ escrowKey)`, the message signed for
/// `OP_CHECKDATASIG`.
pub fn settlement_digest(action: Action, escrow_key: &[u8; 32]) -> [u8; 32] {
    let mut msg = [0u8; 33];
    msg[0] = action.as_byte();
    msg[1..].copy_from_slice(escrow_key);
    sha256(&msg)
}

/// Release code candidate number `index` for `root`.
pub fn escrow_key_candidate(root: &ChainSecret, index: u32) -> [u8; 32] {
    let suffix = index.to_string();
    let mut buf = Vec::with_capacity(32 + suffix.len());
    buf.extend_from_slice(root.as_bytes());
    buf.extend_from_slice(suffix.as_bytes());
    sha256(&buf)
}

/// Find the release code whose HASH160 is `target`.
pub fn find_escrow_key(root: &ChainSecret, target: &[u8; 20]) -> Result<[u8; 32], EscrowError> {
    for i in 0..ESCROW_KEY_SEARCH_LIMIT {
        let candidate = escrow_key_candidate(root, i);
        if &hash160(&candidate) == target {
            debug!(index = i, "settlement: escrow key found");
            return Ok(candidate);
        }
    }
    Err(EscrowError::EscrowKeyNotFound {
        searched: ESCROW_KEY_SEARCH_LIMIT,
    })
}

/// Produce the token that lets the other party spend the escrow.
///
/// `key` is the wallet key matched to the escrow; `escrow_root` is only
/// needed for commit-reveal escrows.
pub fn authorize(
    codec: &AddressCodec,
    terms: &EscrowTerms,
    key: &RawPrivateKey,
    escrow_root: Option<&ChainSecret>,
) -> Result<SettlementToken, EscrowError> {
    let action = Action::granted_by(terms.party())?;
    let token = match terms {
        EscrowTerms::CheckDataSig { escrow_key, .. } => {
            let sk = AddressCodec::secret_key(key)?;
            let msg = Message::from_digest(settlement_digest(action, escrow_key));
            let signature = codec.secp().sign_ecdsa(&msg, &sk);
            let public_key = codec.public_key(key)?.serialize_uncompressed().to_vec();
            SettlementToken::CheckDataSig {
                action,
                public_key,
                signature: signature.serialize_der().to_vec(),
            }
        }
        EscrowTerms::CommitReveal {
            party,
            seller_release_hash,
            buyer_release_hash,
            ..
        } => {
            let root = escrow_root.ok_or(EscrowError::MissingEscrowRoot)?;
            let target = if *party == Party::Buyer {
                buyer_release_hash
            } else {
                seller_release_hash
            };
            SettlementToken::CommitReveal {
                action,
                preimage: find_escrow_key(root, target)?,
            }
        }
    };
    info!(model = %terms.model(), %action, "settlement: authorization created");
    Ok(token)
}
