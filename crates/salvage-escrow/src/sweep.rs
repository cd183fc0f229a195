//! Sweep transaction assembly and signing.
//!
//! A sweep spends every selected escrow output to a single destination.
//! The transaction is signed once with a placeholder fee, measured, and
//! re-signed with `fee = fee_rate × vsize`. Every signature is ground to a
//! fixed DER length, so the second pass has the size the first one measured
//! and the fee matches the signed bytes exactly.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, PubkeyHash, ScriptBuf, ScriptHash, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness, WitnessProgram, WitnessVersion,
};
use tracing::{debug, info, warn};

use salvage_core::base58;
use salvage_core::cashaddr::{CashAddr, CashAddrKind};
use salvage_core::{AddressCodec, AssetKind};
use salvage_wallet::DerivedAddress;

use crate::error::{EscrowError, SweepError};
use crate::feed::EscrowUtxo;
use crate::script::{self, Party};
use crate::settlement::SettlementToken;
use crate::sighash::{bip143_digest, SIGHASH_ALL, SIGHASH_ALL_FORKID};

/// Fee used for the first signing pass, before the size is known.
pub const PLACEHOLDER_FEE: u64 = 1;

/// Replace-by-fee signalling sequence for segwit inputs.
const SEGWIT_SEQUENCE: u32 = 0xFFFF_FFFD;
const FINAL_SEQUENCE: u32 = 0xFFFF_FFFF;

/// DER length with both `r` and `s` a full 32 bytes and no sign padding.
const FIXED_DER_LEN: usize = 70;

/// An escrow output together with the wallet key that can spend it.
#[derive(Debug, Clone)]
pub struct SweepInput {
    pub utxo: EscrowUtxo,
    pub key: DerivedAddress,
}

/// Everything needed to build a sweep.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub asset: AssetKind,
    pub inputs: Vec<SweepInput>,
    pub destination: String,
    /// Smallest units per virtual byte.
    pub fee_rate: u64,
}

/// Destination after BCH CashAddr normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Unchanged(String),
    Converted { original: String, legacy: String },
    /// Could not be decoded; the original text is used as-is.
    Fallback { original: String, reason: String },
}

impl Normalized {
    /// The address the transaction pays to.
    pub fn address(&self) -> &str {
        match self {
            Normalized::Unchanged(s) => s,
            Normalized::Converted { legacy, .. } => legacy,
            Normalized::Fallback { original, .. } => original,
        }
    }
}

/// A signed sweep, ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedSweep {
    pub transaction: Transaction,
    pub hex: String,
    pub txid: String,
    pub vsize: usize,
    pub fee: u64,
    pub output_value: u64,
    pub destination: Normalized,
}

/// Convert a BCH CashAddr destination to its legacy base58 form.
pub fn normalize_bch_destination(address: &str) -> Normalized {
    let address = address.trim();
    match CashAddr::decode(address) {
        Ok(cash) => {
            let params = AssetKind::Bch.params();
            let version = match (cash.kind(), params) {
                (CashAddrKind::P2pkh, Some(p)) => p.pubkey_hash_version,
                (CashAddrKind::P2sh, Some(p)) => p.script_hash_version,
                (_, None) => {
                    return Normalized::Fallback {
                        original: address.to_string(),
                        reason: "no chain parameters for BCH".into(),
                    };
                }
            };
            Normalized::Converted {
                original: address.to_string(),
                legacy: base58::encode_address(version, cash.hash()),
            }
        }
        Err(cash_err) => {
            if base58::decode_address(address).is_ok() {
                return Normalized::Unchanged(address.to_string());
            }
            warn!(
                %address,
                err = %cash_err,
                "sweep: could not normalize BCH destination, using it as entered"
            );
            Normalized::Fallback {
                original: address.to_string(),
                reason: cash_err.to_string(),
            }
        }
    }
}

/// Output script paying `address` on `asset`.
pub fn destination_script(asset: AssetKind, address: &str) -> Result<ScriptBuf, SweepError> {
    let params = asset.utxo_params()?;
    let invalid = |reason: String| SweepError::InvalidDestination(format!("{address}: {reason}"));

    if let Some(hrp) = params.bech32_hrp {
        if address.to_lowercase().starts_with(&format!("{hrp}1")) {
            let (decoded_hrp, version, program) =
                bech32::segwit::decode(address).map_err(|e| invalid(e.to_string()))?;
            if decoded_hrp.to_lowercase() != hrp {
                return Err(invalid(format!("wrong network prefix {decoded_hrp}")));
            }
            let version =
                WitnessVersion::try_from(version.to_u8()).map_err(|e| invalid(e.to_string()))?;
            let program =
                WitnessProgram::new(version, &program).map_err(|e| invalid(e.to_string()))?;
            return Ok(ScriptBuf::new_witness_program(&program));
        }
    }

    let (version, hash) = base58::decode_address(address).map_err(|e| invalid(e.to_string()))?;
    if version == params.pubkey_hash_version {
        Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)))
    } else if version == params.script_hash_version {
        Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)))
    } else {
        Err(invalid(format!("version byte {version:#04x} is not a {asset} address")))
    }
}

/// One input with everything decoded that signing needs.
struct PreparedInput {
    value: Amount,
    redeem_script: ScriptBuf,
    witness_script: Option<ScriptBuf>,
    token: SettlementToken,
    secret_key: SecretKey,
    own_public_key: Vec<u8>,
}

impl PreparedInput {
    fn prepare(
        codec: &AddressCodec,
        asset: AssetKind,
        input: &SweepInput,
    ) -> Result<(TxIn, Self), SweepError> {
        let utxo = &input.utxo;
        if utxo.asset() != Some(asset) {
            return Err(SweepError::InvalidInput(format!(
                "{} is a {} output, not {asset}",
                utxo.outpoint(),
                utxo.crypto
            )));
        }
        let payload = utxo
            .revealed_payload
            .as_deref()
            .ok_or_else(|| SweepError::MissingPayload {
                txid: utxo.txid.clone(),
                vout: utxo.vout,
            })?;
        let redeem = utxo.redeem_script_bytes()?;
        let witness = utxo.witness_script_bytes()?;
        if asset.is_segwit() && witness.is_none() {
            return Err(SweepError::MissingWitnessScript {
                txid: utxo.txid.clone(),
                vout: utxo.vout,
            });
        }

        let terms = script::parse(
            codec,
            asset,
            &utxo.escrow_model,
            &redeem,
            witness.as_deref(),
            &input.key,
        )?;
        if terms.party() == Party::Unknown {
            return Err(EscrowError::NotAParty.into());
        }
        let token = SettlementToken::parse(&utxo.escrow_model, payload)?;
        token.verify(codec, &terms)?;
        if matches!(token, SettlementToken::CheckDataSig { .. }) && asset.is_segwit() {
            return Err(SweepError::InvalidInput(format!(
                "{}: checkdatasig escrows cannot be spent on {asset}",
                utxo.outpoint()
            )));
        }

        let txid = Txid::from_str(&utxo.txid)
            .map_err(|e| SweepError::InvalidInput(format!("txid {}: {e}", utxo.txid)))?;
        let sequence = if asset.is_segwit() {
            SEGWIT_SEQUENCE
        } else {
            FINAL_SEQUENCE
        };
        let txin = TxIn {
            previous_output: OutPoint {
                txid,
                vout: utxo.vout,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence(sequence),
            witness: Witness::new(),
        };

        let prepared = PreparedInput {
            value: Amount::from_sat(utxo.value),
            redeem_script: ScriptBuf::from_bytes(redeem),
            witness_script: witness.map(ScriptBuf::from_bytes),
            token,
            secret_key: AddressCodec::secret_key(&input.key.private_key)?,
            own_public_key: codec.wallet_public_key(asset, &input.key.private_key)?,
        };
        Ok((txin, prepared))
    }

    /// Signature digest and the sighash byte appended to the signature.
    fn digest(
        &self,
        cache: &mut SighashCache<&Transaction>,
        tx: &Transaction,
        vin: usize,
    ) -> Result<([u8; 32], u8), SweepError> {
        match (&self.token, &self.witness_script) {
            (SettlementToken::CheckDataSig { .. }, _) => Ok((
                bip143_digest(tx, vin, &self.redeem_script, self.value, SIGHASH_ALL_FORKID)?,
                SIGHASH_ALL_FORKID as u8,
            )),
            (SettlementToken::CommitReveal { .. }, Some(witness_script)) => {
                let hash = cache
                    .p2wsh_signature_hash(vin, witness_script, self.value, EcdsaSighashType::All)
                    .map_err(|e| SweepError::InvalidInput(e.to_string()))?;
                Ok((hash.to_byte_array(), SIGHASH_ALL as u8))
            }
            (SettlementToken::CommitReveal { .. }, None) => {
                let hash = cache
                    .legacy_signature_hash(vin, &self.redeem_script, SIGHASH_ALL)
                    .map_err(|e| SweepError::InvalidInput(e.to_string()))?;
                Ok((hash.to_byte_array(), SIGHASH_ALL as u8))
            }
        }
    }

    /// Fill in scriptSig and witness for a finished signature.
    fn unlock(&self, txin: &mut TxIn, signature: Vec<u8>) -> Result<(), SweepError> {
        match (&self.token, &self.witness_script) {
            (
                SettlementToken::CheckDataSig {
                    action,
                    public_key,
                    signature: revealer_signature,
                },
                _,
            ) => {
                let mut b = Builder::new();
                b = push(b, &signature)?;
                b = push(b, &self.own_public_key)?;
                b = push(b, revealer_signature)?;
                b = push(b, public_key)?;
                b = b.push_int(i64::from(action.as_byte()));
                b = push(b, self.redeem_script.as_bytes())?;
                txin.script_sig = b.into_script();
                txin.witness = Witness::new();
            }
            (SettlementToken::CommitReveal { action, preimage }, Some(witness_script)) => {
                txin.script_sig =
                    push(Builder::new(), self.redeem_script.as_bytes())?.into_script();
                txin.witness = Witness::from_slice(&[
                    signature,
                    self.own_public_key.clone(),
                    preimage.to_vec(),
                    vec![action.as_byte()],
                    witness_script.to_bytes(),
                ]);
            }
            (SettlementToken::CommitReveal { action, preimage }, None) => {
                let mut b = Builder::new();
                b = push(b, &signature)?;
                b = push(b, &self.own_public_key)?;
                b = push(b, preimage)?;
                b = b.push_int(i64::from(action.as_byte()));
                b = push(b, self.redeem_script.as_bytes())?;
                txin.script_sig = b.into_script();
                txin.witness = Witness::new();
            }
        }
        Ok(())
    }
}

fn push(builder: Builder, bytes: &[u8]) -> Result<Builder, SweepError> {
    let data = PushBytesBuf::try_from(bytes.to_vec())
        .map_err(|e| SweepError::InvalidInput(format!("push too large: {e}")))?;
    Ok(builder.push_slice(data))
}

/// RFC 6979 signature whose DER encoding is exactly [`FIXED_DER_LEN`]
/// bytes. Extra nonce data is counted up until `r` and `s` both fill 32
/// bytes, about two attempts on average.
fn sign_fixed_len(codec: &AddressCodec, digest: [u8; 32], key: &SecretKey) -> Signature {
    let msg = Message::from_digest(digest);
    let mut signature = codec.secp().sign_ecdsa(&msg, key);
    let mut counter: u32 = 0;
    while signature.serialize_der().len() != FIXED_DER_LEN {
        counter += 1;
        let mut extra = [0u8; 32];
        extra[..4].copy_from_slice(&counter.to_le_bytes());
        signature = codec.secp().sign_ecdsa_with_noncedata(&msg, key, &extra);
    }
    signature
}

/// Sign every input against the current outputs.
fn sign_all(
    codec: &AddressCodec,
    tx: &mut Transaction,
    inputs: &[PreparedInput],
) -> Result<(), SweepError> {
    let digests = {
        let shared: &Transaction = tx;
        let mut cache = SighashCache::new(shared);
        inputs
            .iter()
            .enumerate()
            .map(|(vin, input)| input.digest(&mut cache, shared, vin))
            .collect::<Result<Vec<_>, _>>()?
    };

    for ((txin, input), (digest, sighash_byte)) in
        tx.input.iter_mut().zip(inputs).zip(digests)
    {
        let signature = sign_fixed_len(codec, digest, &input.secret_key);
        let mut der = signature.serialize_der().to_vec();
        der.push(sighash_byte);
        input.unlock(txin, der)?;
    }
    Ok(())
}

/// Build and sign a sweep of `plan.inputs` to `plan.destination`.
pub fn build_sweep(codec: &AddressCodec, plan: &SweepPlan) -> Result<SignedSweep, SweepError> {
    if plan.inputs.is_empty() {
        return Err(SweepError::NoInputs);
    }
    let asset = plan.asset;
    let destination = match asset {
        AssetKind::Bch => normalize_bch_destination(&plan.destination),
        _ => Normalized::Unchanged(plan.destination.trim().to_string()),
    };
    let script_pubkey = destination_script(asset, destination.address())?;

    let mut txins = Vec::with_capacity(plan.inputs.len());
    let mut prepared = Vec::with_capacity(plan.inputs.len());
    let mut total: u64 = 0;
    for input in &plan.inputs {
        let (txin, p) = PreparedInput::prepare(codec, asset, input)?;
        total = total
            .checked_add(input.utxo.value)
            .ok_or(SweepError::Overflow)?;
        txins.push(txin);
        prepared.push(p);
    }

    let placeholder_output =
        total
            .checked_sub(PLACEHOLDER_FEE)
            .ok_or(SweepError::InsufficientFunds {
                have: total,
                need: PLACEHOLDER_FEE,
            })?;
    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: txins,
        output: vec![TxOut {
            value: Amount::from_sat(placeholder_output),
            script_pubkey,
        }],
    };
    sign_all(codec, &mut tx, &prepared)?;

    let measured = tx.vsize();
    let fee = plan
        .fee_rate
        .checked_mul(measured as u64)
        .ok_or(SweepError::Overflow)?;
    let output_value = total
        .checked_sub(fee)
        .ok_or(SweepError::InsufficientFunds { have: total, need: fee })?;
    debug!(vsize = measured, fee, "sweep: re-signing with measured fee");
    tx.output[0].value = Amount::from_sat(output_value);
    sign_all(codec, &mut tx, &prepared)?;
    if tx.vsize() != measured {
        return Err(SweepError::SizeChanged {
            measured,
            signed: tx.vsize(),
        });
    }

    let vsize = tx.vsize();
    let txid = tx.compute_txid().to_string();
    info!(
        %asset,
        inputs = tx.input.len(),
        vsize,
        fee = total - output_value,
        %txid,
        "sweep: transaction signed"
    );
    Ok(SignedSweep {
        hex: serialize_hex(&tx),
        txid,
        vsize,
        fee: total - output_value,
        output_value,
        destination,
        transaction: tx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::opcodes::all::OP_NOP;
    use bitcoin::secp256k1::PublicKey;
    use salvage_core::hash::{hash160, sha256};
    use salvage_core::RawPrivateKey;

    use crate::feed::EscrowModel;
    use crate::settlement::{self, Action};
    use crate::sighash::bip143_digest;

    fn template(len: usize, pushes: &[(usize, Vec<u8>)]) -> Vec<u8> {
        let mut b = Builder::new();
        for i in 0..len {
            b = match pushes.iter().find(|(pos, _)| *pos == i) {
                Some((_, bytes)) => push(b, bytes).unwrap(),
                None => b.push_opcode(OP_NOP),
            };
        }
        b.into_script().into_bytes()
    }

    fn derived(asset: AssetKind, byte: u8) -> DerivedAddress {
        DerivedAddress::derive(
            &AddressCodec::new(),
            asset,
            0,
            RawPrivateKey::from_bytes([byte; 32]),
        )
    }

    const PREIMAGE: [u8; 32] = [0x77; 32];

    /// BTC commit-reveal escrow where `me` is the buyer and the seller has
    /// revealed their release code.
    fn btc_input(me: &DerivedAddress, value: u64, n: u8) -> SweepInput {
        let codec = AddressCodec::new();
        let my_pkh = hash160(&codec.public_key(&me.private_key).unwrap().serialize());
        let witness = template(
            30,
            &[
                (5, my_pkh.to_vec()),
                (6, hash160(&PREIMAGE).to_vec()),
                (21, vec![0x22; 20]),
                (22, vec![0x33; 20]),
            ],
        );
        let mut redeem = vec![0x00, 0x20];
        redeem.extend(sha256(&witness));
        SweepInput {
            utxo: EscrowUtxo {
                crypto: "BTC".into(),
                address_identifier: me.identifier.unwrap().to_feed_hex(),
                txid: format!("{n:02x}").repeat(32),
                vout: u32::from(n),
                value,
                escrow_model: EscrowModel::CommitRevealV1,
                revealed_payload: Some(format!("release_by_seller:{}", hex::encode(PREIMAGE))),
                redeem_script: hex::encode(redeem),
                witness_script: Some(hex::encode(witness)),
            },
            key: me.clone(),
        }
    }

    fn btc_plan(inputs: Vec<SweepInput>, fee_rate: u64) -> SweepPlan {
        SweepPlan {
            asset: AssetKind::Btc,
            inputs,
            destination: "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".into(),
            fee_rate,
        }
    }

    #[test]
    fn segwit_sweep_satisfies_fee_invariant() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Btc, 0x42);
        let plan = btc_plan(vec![btc_input(&me, 60_000, 1), btc_input(&me, 40_000, 2)], 7);
        let sweep = build_sweep(&codec, &plan).unwrap();

        assert_eq!(sweep.vsize, sweep.transaction.vsize());
        assert_eq!(sweep.fee, 7 * sweep.vsize as u64);
        assert_eq!(sweep.output_value + sweep.fee, 100_000);
        assert_eq!(sweep.transaction.output[0].value.to_sat(), sweep.output_value);
        assert_eq!(sweep.hex, serialize_hex(&sweep.transaction));

        for txin in &sweep.transaction.input {
            assert_eq!(txin.sequence, Sequence(SEGWIT_SEQUENCE));
            assert_eq!(txin.witness.len(), 5);
            assert_eq!(txin.witness.nth(2).unwrap(), PREIMAGE.as_slice());
            assert_eq!(
                txin.witness.nth(3).unwrap(),
                [Action::ReleaseBySeller.as_byte()].as_slice()
            );
        }
    }

    #[test]
    fn segwit_signatures_verify_against_final_bytes() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Btc, 0x42);
        let inputs = vec![btc_input(&me, 60_000, 1), btc_input(&me, 40_000, 2)];
        let sweep = build_sweep(&codec, &btc_plan(inputs.clone(), 3)).unwrap();
        let tx = &sweep.transaction;
        let pk = codec.public_key(&me.private_key).unwrap();

        let mut cache = SighashCache::new(tx);
        for (vin, input) in inputs.iter().enumerate() {
            let witness_script =
                ScriptBuf::from_bytes(input.utxo.witness_script_bytes().unwrap().unwrap());
            let digest = cache
                .p2wsh_signature_hash(
                    vin,
                    &witness_script,
                    Amount::from_sat(input.utxo.value),
                    EcdsaSighashType::All,
                )
                .unwrap();
            let sig_bytes = tx.input[vin].witness.nth(0).unwrap();
            let (der, ty) = sig_bytes.split_at(sig_bytes.len() - 1);
            assert_eq!(ty, [0x01]);
            let sig = Signature::from_der(der).unwrap();
            codec
                .secp()
                .verify_ecdsa(&Message::from_digest(digest.to_byte_array()), &sig, &pk)
                .unwrap();
        }
    }

    #[test]
    fn signatures_have_fixed_der_length() {
        let codec = AddressCodec::new();
        let key = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let pk = PublicKey::from_secret_key(codec.secp(), &key);
        for i in 0u32..300 {
            let digest = sha256(&i.to_le_bytes());
            let sig = sign_fixed_len(&codec, digest, &key);
            assert_eq!(sig.serialize_der().len(), FIXED_DER_LEN);
            codec
                .secp()
                .verify_ecdsa(&Message::from_digest(digest), &sig, &pk)
                .unwrap();
            assert_eq!(sign_fixed_len(&codec, digest, &key), sig);
        }
    }

    #[test]
    fn fee_is_exact_at_every_rate() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Btc, 0x42);
        let inputs: Vec<_> = (1..=4).map(|n| btc_input(&me, 250_000, n)).collect();
        for rate in 0..=120 {
            let sweep = build_sweep(&codec, &btc_plan(inputs.clone(), rate)).unwrap();
            assert_eq!(sweep.fee, rate * sweep.transaction.vsize() as u64, "rate {rate}");
            assert_eq!(sweep.output_value + sweep.fee, 1_000_000);
        }
    }

    #[test]
    fn zero_fee_rate_pays_everything() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Btc, 0x42);
        let sweep = build_sweep(&codec, &btc_plan(vec![btc_input(&me, 5_000, 1)], 0)).unwrap();
        assert_eq!(sweep.fee, 0);
        assert_eq!(sweep.output_value, 5_000);
    }

    #[test]
    fn insufficient_funds() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Btc, 0x42);
        let err = build_sweep(&codec, &btc_plan(vec![btc_input(&me, 100, 1)], 50)).unwrap_err();
        assert!(matches!(err, SweepError::InsufficientFunds { have: 100, .. }));
    }

    #[test]
    fn missing_payload_rejected() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Btc, 0x42);
        let mut input = btc_input(&me, 5_000, 9);
        input.utxo.revealed_payload = None;
        assert_eq!(
            build_sweep(&codec, &btc_plan(vec![input], 1)).unwrap_err(),
            SweepError::MissingPayload { txid: "09".repeat(32), vout: 9 }
        );
    }

    #[test]
    fn wrong_preimage_rejected() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Btc, 0x42);
        let mut input = btc_input(&me, 5_000, 1);
        input.utxo.revealed_payload = Some(format!("release_by_seller:{}", "00".repeat(32)));
        assert!(matches!(
            build_sweep(&codec, &btc_plan(vec![input], 1)).unwrap_err(),
            SweepError::Escrow(EscrowError::InvalidToken(_))
        ));
    }

    #[test]
    fn stranger_cannot_sweep() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Btc, 0x42);
        let mut input = btc_input(&me, 5_000, 1);
        input.key = derived(AssetKind::Btc, 0x43);
        assert_eq!(
            build_sweep(&codec, &btc_plan(vec![input], 1)).unwrap_err(),
            SweepError::Escrow(EscrowError::NotAParty)
        );
    }

    #[test]
    fn empty_plan_rejected() {
        let codec = AddressCodec::new();
        assert_eq!(build_sweep(&codec, &btc_plan(vec![], 1)).unwrap_err(), SweepError::NoInputs);
    }

    /// BCH checkdatasig escrow where `me` is the buyer and the seller has
    /// signed a release.
    fn bch_input(me: &DerivedAddress, seller_key: &RawPrivateKey, value: u64) -> SweepInput {
        let codec = AddressCodec::new();
        let seller_pkh =
            hash160(&codec.public_key(seller_key).unwrap().serialize_uncompressed());
        let my_pkh = *me.identifier.unwrap().as_bytes();
        let escrow_key = [0xE5; 32];
        let redeem = template(
            40,
            &[
                (4, seller_pkh.to_vec()),
                (5, my_pkh.to_vec()),
                (11, vec![0xAA; 20]),
                (31, escrow_key.to_vec()),
            ],
        );
        let seller_terms = crate::script::EscrowTerms::CheckDataSig {
            party: Party::Seller,
            seller_pkh,
            buyer_pkh: my_pkh,
            arbitrator_pkh: [0xAA; 20],
            escrow_key,
        };
        let token = settlement::authorize(&codec, &seller_terms, seller_key, None).unwrap();
        SweepInput {
            utxo: EscrowUtxo {
                crypto: "BCH".into(),
                address_identifier: me.identifier.unwrap().to_feed_hex(),
                txid: "5a".repeat(32),
                vout: 0,
                value,
                escrow_model: EscrowModel::CheckDataSigV1,
                revealed_payload: Some(token.to_string()),
                redeem_script: hex::encode(redeem),
                witness_script: None,
            },
            key: me.clone(),
        }
    }

    #[test]
    fn checkdatasig_sweep_signs_with_forkid() {
        let codec = AddressCodec::new();
        let me = derived(AssetKind::Bch, 0x51);
        let seller = RawPrivateKey::from_bytes([0x52; 32]);
        let input = bch_input(&me, &seller, 80_000);
        let plan = SweepPlan {
            asset: AssetKind::Bch,
            inputs: vec![input.clone()],
            destination: "bitcoincash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2".into(),
            fee_rate: 2,
        };
        let sweep = build_sweep(&codec, &plan).unwrap();
        assert!(matches!(sweep.destination, Normalized::Converted { .. }));
        assert_eq!(sweep.fee, 2 * sweep.vsize as u64);

        let tx = &sweep.transaction;
        let txin = &tx.input[0];
        assert_eq!(txin.sequence, Sequence(FINAL_SEQUENCE));
        assert!(txin.witness.is_empty());

        let tokens = crate::script::tokenize(txin.script_sig.as_bytes()).unwrap();
        assert_eq!(tokens.len(), 6);
        let crate::script::Token::Push(sig_bytes) = &tokens[0] else {
            panic!("signature push expected");
        };
        let (der, ty) = sig_bytes.split_at(sig_bytes.len() - 1);
        assert_eq!(ty, [0x41]);

        let redeem = ScriptBuf::from_bytes(input.utxo.redeem_script_bytes().unwrap());
        let digest = bip143_digest(tx, 0, &redeem, Amount::from_sat(80_000), 0x41).unwrap();
        let pk: PublicKey = codec.public_key(&me.private_key).unwrap();
        codec
            .secp()
            .verify_ecdsa(&Message::from_digest(digest), &Signature::from_der(der).unwrap(), &pk)
            .unwrap();
    }

    #[test]
    fn bch_destination_normalization() {
        let converted =
            normalize_bch_destination("bitcoincash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2");
        let Normalized::Converted { legacy, .. } = &converted else {
            panic!("expected conversion, got {converted:?}");
        };
        let hash: [u8; 20] = hex::decode("f5bf48b397dae70be82b3cca4793f8eb2b6cdac9")
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(legacy, &base58::encode_address(0x00, &hash));

        assert_eq!(normalize_bch_destination(legacy), Normalized::Unchanged(legacy.clone()));
        assert!(matches!(
            normalize_bch_destination("not an address"),
            Normalized::Fallback { .. }
        ));
    }

    #[test]
    fn destination_scripts() {
        let upper = "BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4";
        let p2wpkh = destination_script(AssetKind::Btc, upper).unwrap();
        assert!(p2wpkh.is_p2wpkh());
        let p2sh =
            destination_script(AssetKind::Btc, "3JvL6Ymt8MVWiCNHC7oWU6nLeHNJKLZGLN").unwrap();
        assert!(p2sh.is_p2sh());
        assert!(matches!(
            destination_script(AssetKind::Ltc, "3JvL6Ymt8MVWiCNHC7oWU6nLeHNJKLZGLN"),
            Err(SweepError::InvalidDestination(_))
        ));
        assert!(matches!(
            destination_script(AssetKind::Ltc, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"),
            Err(SweepError::InvalidDestination(_))
        ));
        assert!(destination_script(AssetKind::Eth, "0x00").is_err());
    }
}
