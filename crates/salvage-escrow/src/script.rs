//! Escrow script decoding.
//!
//! Escrow scripts are fixed templates, so the interesting values sit at
//! fixed token positions once the script is split into opcodes and pushes.
//! The witness script is decoded when present, otherwise the redeem script.
//!
//! | Model              | Position | Value                          |
//! |--------------------|----------|--------------------------------|
//! | `checkdatasig_v1`  | 4        | seller public key hash         |
//! |                    | 5        | buyer public key hash          |
//! |                    | 11       | arbitrator public key hash     |
//! |                    | 31       | escrow key (32 bytes)          |
//! | `commit_reveal_v1` | 5        | buyer public key hash          |
//! |                    | 6        | hash of seller's release code  |
//! |                    | 21       | seller public key hash         |
//! |                    | 22       | hash of buyer's release code   |

use std::fmt;

use bitcoin::script::{Instruction, Script};

use salvage_core::hash::hash160;
use salvage_core::{AddressCodec, AssetKind};
use salvage_wallet::DerivedAddress;

use crate::error::EscrowError;
use crate::feed::EscrowModel;

/// Which side of the trade the wallet key is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Seller,
    Buyer,
    Unknown,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Party::Seller => "Seller",
            Party::Buyer => "Buyer",
            Party::Unknown => "Unknown",
        })
    }
}

/// Decoded escrow parameters plus the caller's role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowTerms {
    CheckDataSig {
        party: Party,
        seller_pkh: [u8; 20],
        buyer_pkh: [u8; 20],
        arbitrator_pkh: [u8; 20],
        escrow_key: [u8; 32],
    },
    CommitReveal {
        party: Party,
        buyer_pkh: [u8; 20],
        seller_release_hash: [u8; 20],
        seller_pkh: [u8; 20],
        buyer_release_hash: [u8; 20],
    },
}

impl EscrowTerms {
    pub fn party(&self) -> Party {
        match self {
            EscrowTerms::CheckDataSig { party, .. } | EscrowTerms::CommitReveal { party, .. } => {
                *party
            }
        }
    }

    pub fn model(&self) -> EscrowModel {
        match self {
            EscrowTerms::CheckDataSig { .. } => EscrowModel::CheckDataSigV1,
            EscrowTerms::CommitReveal { .. } => EscrowModel::CommitRevealV1,
        }
    }

    /// Labelled fields for display.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        match self {
            EscrowTerms::CheckDataSig {
                party,
                seller_pkh,
                buyer_pkh,
                arbitrator_pkh,
                escrow_key,
            } => vec![
                ("Party Type", party.to_string()),
                ("Seller Public Key Hash", hex::encode(seller_pkh)),
                ("Buyer Public Key Hash", hex::encode(buyer_pkh)),
                ("Arbitrator Public Key Hash", hex::encode(arbitrator_pkh)),
                ("Escrow Key", hex::encode(escrow_key)),
            ],
            EscrowTerms::CommitReveal {
                party,
                buyer_pkh,
                seller_release_hash,
                seller_pkh,
                buyer_release_hash,
            } => vec![
                ("Party Type", party.to_string()),
                ("Seller Public Key Hash", hex::encode(seller_pkh)),
                ("Release Code From Seller Hash", hex::encode(seller_release_hash)),
                ("Buyer Public Key Hash", hex::encode(buyer_pkh)),
                ("Release Code From Buyer Hash", hex::encode(buyer_release_hash)),
            ],
        }
    }
}

/// Decode an escrow script and work out whether `key` is buyer or seller.
pub fn parse(
    codec: &AddressCodec,
    asset: AssetKind,
    model: &EscrowModel,
    redeem_script: &[u8],
    witness_script: Option<&[u8]>,
    key: &DerivedAddress,
) -> Result<EscrowTerms, EscrowError> {
    model.ensure_known()?;
    let script = witness_script.unwrap_or(redeem_script);
    let tokens = tokenize(script)?;

    match model {
        EscrowModel::CheckDataSigV1 => {
            let seller_pkh = push_at::<20>(&tokens, 4)?;
            let buyer_pkh = push_at::<20>(&tokens, 5)?;
            let arbitrator_pkh = push_at::<20>(&tokens, 11)?;
            let escrow_key = push_at::<32>(&tokens, 31)?;
            let mine = key.identifier.map(|id| *id.as_bytes());
            Ok(EscrowTerms::CheckDataSig {
                party: party_of(mine, &seller_pkh, &buyer_pkh),
                seller_pkh,
                buyer_pkh,
                arbitrator_pkh,
                escrow_key,
            })
        }
        EscrowModel::CommitRevealV1 => {
            let buyer_pkh = push_at::<20>(&tokens, 5)?;
            let seller_release_hash = push_at::<20>(&tokens, 6)?;
            let seller_pkh = push_at::<20>(&tokens, 21)?;
            let buyer_release_hash = push_at::<20>(&tokens, 22)?;
            // Segwit identifiers are script hashes; the escrow commits to
            // the plain key hash instead.
            let mine = if asset.is_segwit() {
                let pk = codec.public_key(&key.private_key)?;
                Some(hash160(&pk.serialize()))
            } else {
                key.identifier.map(|id| *id.as_bytes())
            };
            Ok(EscrowTerms::CommitReveal {
                party: party_of(mine, &seller_pkh, &buyer_pkh),
                buyer_pkh,
                seller_release_hash,
                seller_pkh,
                buyer_release_hash,
            })
        }
        EscrowModel::Unknown(name) => Err(EscrowError::UnknownModel(name.clone())),
    }
}

fn party_of(mine: Option<[u8; 20]>, seller: &[u8; 20], buyer: &[u8; 20]) -> Party {
    match mine {
        Some(h) if &h == seller => Party::Seller,
        Some(h) if &h == buyer => Party::Buyer,
        _ => Party::Unknown,
    }
}

/// One script element. Pushes keep their bytes; everything else is an
/// opcode byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Push(Vec<u8>),
    Op(u8),
}

/// Split a script into tokens.
pub fn tokenize(script: &[u8]) -> Result<Vec<Token>, EscrowError> {
    Script::from_bytes(script)
        .instructions()
        .map(|ins| match ins {
            Ok(Instruction::PushBytes(bytes)) => Ok(Token::Push(bytes.as_bytes().to_vec())),
            Ok(Instruction::Op(op)) => Ok(Token::Op(op.to_u8())),
            Err(e) => Err(EscrowError::MalformedScript(e.to_string())),
        })
        .collect()
}

fn push_at<const N: usize>(tokens: &[Token], index: usize) -> Result<[u8; N], EscrowError> {
    match tokens.get(index) {
        Some(Token::Push(bytes)) => bytes.as_slice().try_into().map_err(|_| {
            EscrowError::MalformedScript(format!(
                "token {index}: expected {N}-byte push, got {} bytes",
                bytes.len()
            ))
        }),
        Some(Token::Op(op)) => Err(EscrowError::MalformedScript(format!(
            "token {index}: expected {N}-byte push, got opcode {op:#04x}"
        ))),
        None => Err(EscrowError::MalformedScript(format!(
            "script has {} tokens, need at least {}",
            tokens.len(),
            index + 1
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::opcodes::all::*;
    use bitcoin::script::{Builder, PushBytesBuf};
    use salvage_core::{ChainKeyState, ChainSecret, RawPrivateKey};

    fn push(b: Builder, bytes: &[u8]) -> Builder {
        b.push_slice(PushBytesBuf::try_from(bytes.to_vec()).unwrap())
    }

    /// A script with 20-byte pushes at the given positions and OP_NOP filler.
    fn template(len: usize, pushes: &[(usize, Vec<u8>)]) -> Vec<u8> {
        let mut b = Builder::new();
        for i in 0..len {
            b = match pushes.iter().find(|(pos, _)| *pos == i) {
                Some((_, bytes)) => push(b, bytes),
                None => b.push_opcode(OP_NOP),
            };
        }
        b.into_script().into_bytes()
    }

    fn key(asset: AssetKind) -> DerivedAddress {
        let codec = AddressCodec::new();
        let mut root = [0u8; 32];
        root[31] = 1;
        let (index, raw) = ChainKeyState::new(ChainSecret::from_bytes(root)).step().unwrap();
        DerivedAddress::derive(&codec, asset, index, raw)
    }

    fn checkdatasig_script(seller: [u8; 20], buyer: [u8; 20]) -> Vec<u8> {
        template(
            32,
            &[
                (4, seller.to_vec()),
                (5, buyer.to_vec()),
                (11, vec![0xAA; 20]),
                (31, vec![0xEE; 32]),
            ],
        )
    }

    #[test]
    fn tokenize_counts_pushes_and_ops() {
        let script = push(Builder::new().push_opcode(OP_DUP), &[1, 2, 3])
            .push_opcode(OP_EQUAL)
            .into_script();
        let tokens = tokenize(script.as_bytes()).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Op(OP_DUP.to_u8()),
                Token::Push(vec![1, 2, 3]),
                Token::Op(OP_EQUAL.to_u8())
            ]
        );
    }

    #[test]
    fn tokenize_rejects_truncated_push() {
        assert!(matches!(tokenize(&[0x05, 0x01]), Err(EscrowError::MalformedScript(_))));
    }

    #[test]
    fn checkdatasig_seller_detected() {
        let me = key(AssetKind::Bch);
        let mine = *me.identifier.unwrap().as_bytes();
        let script = checkdatasig_script(mine, [0xBB; 20]);
        let terms = parse(
            &AddressCodec::new(),
            AssetKind::Bch,
            &EscrowModel::CheckDataSigV1,
            &script,
            None,
            &me,
        )
        .unwrap();
        assert_eq!(terms.party(), Party::Seller);
        match terms {
            EscrowTerms::CheckDataSig { arbitrator_pkh, escrow_key, .. } => {
                assert_eq!(arbitrator_pkh, [0xAA; 20]);
                assert_eq!(escrow_key, [0xEE; 32]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn checkdatasig_buyer_and_unknown() {
        let me = key(AssetKind::Bch);
        let mine = *me.identifier.unwrap().as_bytes();
        let codec = AddressCodec::new();
        let as_buyer = checkdatasig_script([0xCC; 20], mine);
        let terms = parse(
            &codec,
            AssetKind::Bch,
            &EscrowModel::CheckDataSigV1,
            &as_buyer,
            None,
            &me,
        )
        .unwrap();
        assert_eq!(terms.party(), Party::Buyer);

        let stranger = checkdatasig_script([0xCC; 20], [0xDD; 20]);
        let terms = parse(
            &codec,
            AssetKind::Bch,
            &EscrowModel::CheckDataSigV1,
            &stranger,
            None,
            &me,
        )
        .unwrap();
        assert_eq!(terms.party(), Party::Unknown);
    }

    #[test]
    fn commit_reveal_segwit_uses_pubkey_hash() {
        let me = key(AssetKind::Btc);
        let codec = AddressCodec::new();
        let pkh = hash160(&codec.public_key(&me.private_key).unwrap().serialize());
        // The P2SH identifier must not be what the script commits to.
        assert_ne!(Some(pkh), me.identifier.map(|i| *i.as_bytes()));

        let witness = template(
            24,
            &[
                (5, vec![0x11; 20]),
                (6, vec![0x22; 20]),
                (21, pkh.to_vec()),
                (22, vec![0x33; 20]),
            ],
        );
        let terms = parse(
            &codec,
            AssetKind::Btc,
            &EscrowModel::CommitRevealV1,
            &[0x00],
            Some(witness.as_slice()),
            &me,
        )
        .unwrap();
        assert_eq!(terms.party(), Party::Seller);
        assert_eq!(terms.describe()[0], ("Party Type", "Seller".to_string()));
    }

    #[test]
    fn commit_reveal_legacy_uses_identifier() {
        let me = key(AssetKind::Dash);
        let mine = me.identifier.unwrap().as_bytes().to_vec();
        let redeem = template(
            24,
            &[
                (5, mine),
                (6, vec![0x22; 20]),
                (21, vec![0x44; 20]),
                (22, vec![0x33; 20]),
            ],
        );
        let terms = parse(
            &AddressCodec::new(),
            AssetKind::Dash,
            &EscrowModel::CommitRevealV1,
            &redeem,
            None,
            &me,
        )
        .unwrap();
        assert_eq!(terms.party(), Party::Buyer);
    }

    #[test]
    fn short_script_is_malformed() {
        let me = key(AssetKind::Bch);
        let script = template(10, &[(4, vec![0; 20]), (5, vec![0; 20])]);
        let err = parse(
            &AddressCodec::new(),
            AssetKind::Bch,
            &EscrowModel::CheckDataSigV1,
            &script,
            None,
            &me,
        )
        .unwrap_err();
        assert!(matches!(err, EscrowError::MalformedScript(_)));
    }

    #[test]
    fn wrong_push_size_is_malformed() {
        let me = key(AssetKind::Bch);
        let script = template(
            32,
            &[(4, vec![0; 19]), (5, vec![0; 20]), (11, vec![0; 20]), (31, vec![0; 32])],
        );
        let err = parse(
            &AddressCodec::new(),
            AssetKind::Bch,
            &EscrowModel::CheckDataSigV1,
            &script,
            None,
            &me,
        )
        .unwrap_err();
        assert!(matches!(err, EscrowError::MalformedScript(_)));
    }

    #[test]
    fn unknown_model_rejected() {
        let me = key(AssetKind::Bch);
        let model = EscrowModel::Unknown("htlc_v2".into());
        assert_eq!(
            parse(&AddressCodec::new(), AssetKind::Bch, &model, &[], None, &me).unwrap_err(),
            EscrowError::UnknownModel("htlc_v2".into())
        );
    }

    #[test]
    fn key_without_identifier_is_unknown_party() {
        let codec = AddressCodec::new();
        let me =
            DerivedAddress::derive(&codec, AssetKind::Eth, 0, RawPrivateKey::from_bytes([3; 32]));
        let script = checkdatasig_script([0; 20], [1; 20]);
        let terms = parse(
            &codec,
            AssetKind::Bch,
            &EscrowModel::CheckDataSigV1,
            &script,
            None,
            &me,
        )
        .unwrap();
        assert_eq!(terms.party(), Party::Unknown);
    }
}
