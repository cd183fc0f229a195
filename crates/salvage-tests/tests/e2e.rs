//! End-to-end recovery scenarios: backup → addresses → export, and the
//! full escrow flow between two backups.

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{ecdsa::Signature, Message};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, ScriptBuf};

use salvage_core::hash::hash160;
use salvage_core::{AddressCodec, AssetKind, ChainSecret};
use salvage_escrow::settlement::escrow_key_candidate;
use salvage_escrow::sighash::{bip143_digest, SIGHASH_ALL_FORKID};
use salvage_escrow::{Normalized, Party, SessionError, Stage, StageStatus, SweepSession};
use salvage_tests::helpers::*;
use salvage_wallet::{AddressBook, GenerationConfig, GenerationOutcome};

#[tokio::test]
async fn cold_start_is_deterministic() {
    let entry = backup(ROOT_ONE, None).entry(AssetKind::Btc).unwrap();

    let first = AddressBook::new(&entry, GenerationConfig::default());
    assert_eq!(
        first.generate_more(1).await.unwrap(),
        GenerationOutcome::Generated { added: 1, total: 1 }
    );
    let second = AddressBook::new(&entry, GenerationConfig::default());
    second.generate_more(1).await.unwrap();

    let a = first.snapshot();
    let b = second.snapshot();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].index, 0);
    assert_eq!(a[0].display_address, b[0].display_address);
    assert_eq!(a[0].serialized_private_key, b[0].serialized_private_key);
    assert!(a[0].display_address.starts_with('3'));
}

#[tokio::test]
async fn reset_restarts_the_chain() {
    let backup = backup(ROOT_ONE, None);
    let btc = backup.entry(AssetKind::Btc).unwrap();
    let book = AddressBook::new(&btc, GenerationConfig::default());
    book.generate_until(5).await.unwrap();
    let first = book.snapshot()[0].clone();

    book.reset(&backup.entry(AssetKind::Ltc).unwrap()).await;
    assert!(book.is_empty());
    book.generate_more(1).await.unwrap();
    let ltc = book.snapshot()[0].clone();
    assert_eq!(book.asset(), AssetKind::Ltc);
    assert_eq!(ltc.private_key, first.private_key);
    assert_ne!(ltc.display_address, first.display_address);

    book.reset(&btc).await;
    book.generate_more(1).await.unwrap();
    assert_eq!(book.snapshot()[0].display_address, first.display_address);
}

#[tokio::test]
async fn export_writes_every_key() {
    let dir = tempfile::tempdir().unwrap();
    let entry = backup(ROOT_ONE, None).entry(AssetKind::Dash).unwrap();
    let config = GenerationConfig {
        export_minimum: 250,
        ..GenerationConfig::default()
    };
    let book = AddressBook::new(&entry, config);
    let path = book.write_export(dir.path(), "LocalCryptos").await.unwrap();

    assert!(path.ends_with("LocalCryptos_DASH_Seeds.txt"));
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.ends_with('\n'));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 250);
    assert!(lines.iter().all(|l| l.starts_with("p2pkh:")));
    let snapshot = book.snapshot();
    assert_eq!(lines[17], snapshot[17].serialized_private_key);
}

#[tokio::test]
async fn search_finds_known_address() {
    let entry = backup(ROOT_ONE, None).entry(AssetKind::Bch).unwrap();
    let book = AddressBook::new(&entry, GenerationConfig::default());
    book.generate_until(40).await.unwrap();
    let target = book.snapshot()[33].clone();
    let query = target.display_address.trim_start_matches("bitcoincash:")[..12].to_uppercase();
    let hits = book.search(&query);
    assert!(hits.iter().any(|h| h.index == 33));
}

struct Trader {
    root: String,
    escrow_root: String,
    key_index: usize,
}

impl Trader {
    fn new(root_byte: u8, escrow_byte: u8, key_index: usize) -> Self {
        Self {
            root: secret_hex(root_byte),
            escrow_root: secret_hex(escrow_byte),
            key_index,
        }
    }

    fn key(&self, asset: AssetKind) -> salvage_wallet::DerivedAddress {
        key_at(asset, &self.root, self.key_index)
    }

    fn release_code(&self, index: u32) -> [u8; 32] {
        escrow_key_candidate(&ChainSecret::from_hex(&self.escrow_root).unwrap(), index)
    }

    fn session(&self, asset: AssetKind) -> SweepSession {
        SweepSession::new(
            backup(&self.root, Some(&self.escrow_root)),
            asset,
            test_session_config(10),
        )
    }
}

/// Feed with one row per party for the same escrow output plus noise.
fn escrow_feed(
    asset: AssetKind,
    model: &str,
    seller: &FeedRow,
    buyer_identifier: String,
) -> String {
    let buyer = FeedRow {
        identifier: buyer_identifier,
        ..seller.clone()
    };
    let noise = FeedRow {
        crypto: asset.ticker().into(),
        identifier: format!("00{}", "ee".repeat(20)),
        txid: "99".repeat(32),
        vout: 0,
        value: 1,
        model: model.into(),
        payload: String::new(),
        redeem_script: vec![0x51],
        witness_script: None,
    };
    feed_csv(&[seller.clone(), buyer, noise])
}

#[tokio::test]
async fn commit_reveal_seller_releases_to_buyer() {
    let asset = AssetKind::Btc;
    let seller = Trader::new(0x10, 0x11, 3);
    let buyer = Trader::new(0x20, 0x21, 6);
    let seller_key = seller.key(asset);
    let buyer_key = buyer.key(asset);

    let witness = commit_reveal_script(
        escrow_pkh(asset, &buyer_key),
        hash160(&seller.release_code(1_234)),
        escrow_pkh(asset, &seller_key),
        hash160(&buyer.release_code(77)),
    );
    let row = FeedRow {
        crypto: "BTC".into(),
        identifier: seller_key.identifier.unwrap().to_feed_hex(),
        txid: "c0".repeat(32),
        vout: 1,
        value: 250_000,
        model: "commit_reveal_v1".into(),
        payload: String::new(),
        redeem_script: p2sh_p2wsh_redeem(&witness),
        witness_script: Some(witness.clone()),
    };
    let feed =
        escrow_feed(asset, "commit_reveal_v1", &row, buyer_key.identifier.unwrap().to_feed_hex());

    // Seller side: find the escrow and produce the release code.
    let mut s = seller.session(asset);
    s.ingest_feed(&feed).unwrap();
    s.extract_keys().await.unwrap();
    assert_eq!(s.filter_utxos().unwrap(), 1);
    assert_eq!(s.inspect(0).unwrap().party(), Party::Seller);
    let token = s.authorize(0).unwrap().to_string();
    assert_eq!(
        token,
        format!("release_by_seller:{}", hex::encode(seller.release_code(1_234)))
    );

    // Buyer side: paste the token and sweep.
    let mut b = buyer.session(asset);
    b.ingest_feed(&feed).unwrap();
    b.extract_keys().await.unwrap();
    assert_eq!(b.filter_utxos().unwrap(), 1);
    assert_eq!(b.inspect(0).unwrap().party(), Party::Buyer);
    assert_eq!(b.status(Stage::BuildSweep), StageStatus::Unavailable);
    b.set_payload(0, &token).unwrap();
    assert_eq!(b.status(Stage::BuildSweep), StageStatus::NotStarted);
    b.set_destination("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    b.set_fee_rate(12);
    let sweep = b.build_sweep().unwrap();

    assert_eq!(sweep.fee, 12 * sweep.vsize as u64);
    assert_eq!(sweep.output_value + sweep.fee, 250_000);

    let tx = &sweep.transaction;
    let codec = AddressCodec::new();
    let digest = SighashCache::new(tx)
        .p2wsh_signature_hash(
            0,
            &ScriptBuf::from_bytes(witness),
            Amount::from_sat(250_000),
            EcdsaSighashType::All,
        )
        .unwrap();
    let sig = tx.input[0].witness.nth(0).unwrap();
    let der = &sig[..sig.len() - 1];
    let pk = codec.public_key(&buyer_key.private_key).unwrap();
    codec
        .secp()
        .verify_ecdsa(
            &Message::from_digest(digest.to_byte_array()),
            &Signature::from_der(der).unwrap(),
            &pk,
        )
        .unwrap();
}

#[tokio::test]
async fn checkdatasig_buyer_returns_to_seller() {
    let asset = AssetKind::Bch;
    let seller = Trader::new(0x30, 0x31, 2);
    let buyer = Trader::new(0x40, 0x41, 8);
    let seller_key = seller.key(asset);
    let buyer_key = buyer.key(asset);
    let escrow_key = [0x5E; 32];

    let redeem = checkdatasig_script(
        escrow_pkh(asset, &seller_key),
        escrow_pkh(asset, &buyer_key),
        [0xAB; 20],
        escrow_key,
    );
    let row = FeedRow {
        crypto: "BCH".into(),
        identifier: buyer_key.identifier.unwrap().to_feed_hex(),
        txid: "b1".repeat(32),
        vout: 0,
        value: 1_000_000,
        model: "checkdatasig_v1".into(),
        payload: String::new(),
        redeem_script: redeem.clone(),
        witness_script: None,
    };
    let feed =
        escrow_feed(asset, "checkdatasig_v1", &row, seller_key.identifier.unwrap().to_feed_hex());

    // Buyer cancels: signs return_by_buyer for the seller.
    let mut b = buyer.session(asset);
    b.ingest_feed(&feed).unwrap();
    b.extract_keys().await.unwrap();
    b.filter_utxos().unwrap();
    let token = b.authorize(0).unwrap().to_string();
    assert!(token.starts_with("return_by_buyer:04"));

    let mut s = seller.session(asset);
    s.ingest_feed(&feed).unwrap();
    s.extract_keys().await.unwrap();
    s.filter_utxos().unwrap();
    s.set_payload(0, &token).unwrap();
    s.set_destination(&seller_key.display_address);
    s.set_fee_rate(1);
    let sweep = s.build_sweep().unwrap();

    assert!(matches!(sweep.destination, Normalized::Converted { .. }));
    assert_eq!(sweep.output_value + sweep.fee, 1_000_000);
    assert_eq!(sweep.fee, sweep.vsize as u64);

    let tx = &sweep.transaction;
    let instructions: Vec<_> = tx.input[0]
        .script_sig
        .instructions()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(instructions.len(), 6);
    let sig = instructions[0].push_bytes().unwrap().as_bytes();
    assert_eq!(*sig.last().unwrap(), 0x41);
    let digest = bip143_digest(
        tx,
        0,
        &ScriptBuf::from_bytes(redeem),
        Amount::from_sat(1_000_000),
        SIGHASH_ALL_FORKID,
    )
    .unwrap();
    let codec = AddressCodec::new();
    codec
        .secp()
        .verify_ecdsa(
            &Message::from_digest(digest),
            &Signature::from_der(&sig[..sig.len() - 1]).unwrap(),
            &codec.public_key(&seller_key.private_key).unwrap(),
        )
        .unwrap();
}

#[tokio::test]
async fn stranger_cannot_authorize() {
    let asset = AssetKind::Dash;
    let owner = Trader::new(0x50, 0x51, 1);
    let owner_key = owner.key(asset);
    let script = commit_reveal_script([1; 20], [2; 20], [3; 20], [4; 20]);
    let row = FeedRow {
        crypto: "DASH".into(),
        identifier: owner_key.identifier.unwrap().to_feed_hex(),
        txid: "d0".repeat(32),
        vout: 0,
        value: 5_000,
        model: "commit_reveal_v1".into(),
        payload: String::new(),
        redeem_script: script,
        witness_script: None,
    };
    let mut s = owner.session(asset);
    s.ingest_feed(&feed_csv(&[row])).unwrap();
    s.extract_keys().await.unwrap();
    assert_eq!(s.filter_utxos().unwrap(), 1);
    assert_eq!(s.inspect(0).unwrap().party(), Party::Unknown);
    assert!(matches!(
        s.authorize(0).unwrap_err(),
        SessionError::Escrow(salvage_escrow::EscrowError::NotAParty)
    ));
}
