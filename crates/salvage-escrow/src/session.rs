//! The four-stage sweep workflow.
//!
//! 1. fetch the escrow UTXO feed
//! 2. extract wallet keys from the backup
//! 3. filter the feed down to outputs those keys control
//! 4. build and sign the sweep
//!
//! A stage is [`StageStatus::Unavailable`] until the stages before it are
//! complete. Redoing a stage discards everything downstream of it.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use salvage_core::{AddressCodec, AssetKind};
use salvage_wallet::{AddressBook, DerivedAddress, GenerationConfig, WalletBackup};

use crate::error::{SessionError, SweepError};
use crate::feed::{parse_csv, EscrowModel, EscrowUtxo, FeedSource, DEFAULT_MIN_FEED_ROWS};
use crate::script::{self, EscrowTerms};
use crate::settlement::{self, SettlementToken};
use crate::sweep::{build_sweep, SignedSweep, SweepInput, SweepPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    FetchUtxos,
    ExtractKeys,
    FilterUtxos,
    BuildSweep,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::FetchUtxos,
        Stage::ExtractKeys,
        Stage::FilterUtxos,
        Stage::BuildSweep,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::FetchUtxos => "fetch escrow UTXOs",
            Stage::ExtractKeys => "extract wallet keys",
            Stage::FilterUtxos => "filter escrow UTXOs",
            Stage::BuildSweep => "build sweep transaction",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    NotStarted,
    Complete,
    Unavailable,
}

/// Session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of wallet keys checked against the feed.
    pub scan_depth: usize,
    pub min_feed_rows: usize,
    pub generation: GenerationConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_depth: 10_000,
            min_feed_rows: DEFAULT_MIN_FEED_ROWS,
            generation: GenerationConfig::default(),
        }
    }
}

/// A feed output matched to a wallet key.
#[derive(Debug, Clone)]
pub struct FilteredUtxo {
    pub utxo: EscrowUtxo,
    pub key: DerivedAddress,
    pub selected: bool,
}

/// Explicit state for one recovery run over one backup.
pub struct SweepSession {
    codec: AddressCodec,
    backup: WalletBackup,
    config: SessionConfig,
    asset: AssetKind,
    utxos: Option<Vec<EscrowUtxo>>,
    keys: Option<Vec<DerivedAddress>>,
    filtered: Option<Vec<FilteredUtxo>>,
    destination: Option<String>,
    fee_rate: Option<u64>,
    sweep: Option<SignedSweep>,
}

impl fmt::Debug for SweepSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepSession")
            .field("asset", &self.asset)
            .field("utxos", &self.utxos.as_ref().map(Vec::len))
            .field("keys", &self.keys.as_ref().map(Vec::len))
            .field("filtered", &self.filtered.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl SweepSession {
    pub fn new(backup: WalletBackup, asset: AssetKind, config: SessionConfig) -> Self {
        Self {
            codec: AddressCodec::new(),
            backup,
            config,
            asset,
            utxos: None,
            keys: None,
            filtered: None,
            destination: None,
            fee_rate: None,
            sweep: None,
        }
    }

    pub fn asset(&self) -> AssetKind {
        self.asset
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        let (done, ready) = match stage {
            Stage::FetchUtxos => (self.utxos.is_some(), true),
            Stage::ExtractKeys => (self.keys.is_some(), self.utxos.is_some()),
            Stage::FilterUtxos => (
                self.filtered.is_some(),
                self.utxos.is_some() && self.keys.is_some(),
            ),
            Stage::BuildSweep => (
                self.sweep.is_some(),
                self.filtered
                    .as_ref()
                    .is_some_and(|f| f.iter().any(|u| u.selected)),
            ),
        };
        match (done, ready) {
            (true, _) => StageStatus::Complete,
            (false, true) => StageStatus::NotStarted,
            (false, false) => StageStatus::Unavailable,
        }
    }

    fn require(&self, stage: Stage) -> Result<(), SessionError> {
        match self.status(stage) {
            StageStatus::Unavailable => Err(SessionError::StageUnavailable(stage)),
            _ => Ok(()),
        }
    }

    /// Stage 1: download or read the feed.
    pub async fn fetch_utxos(&mut self, source: &FeedSource) -> Result<usize, SessionError> {
        let result = source.load(self.config.min_feed_rows).await;
        self.accept_feed(result.map_err(SessionError::from))
    }

    /// Stage 1 from CSV text already in memory.
    pub fn ingest_feed(&mut self, text: &str) -> Result<usize, SessionError> {
        let result = parse_csv(text, self.config.min_feed_rows);
        self.accept_feed(result.map_err(SessionError::from))
    }

    fn accept_feed(
        &mut self,
        result: Result<Vec<EscrowUtxo>, SessionError>,
    ) -> Result<usize, SessionError> {
        self.keys = None;
        self.filtered = None;
        self.sweep = None;
        match result {
            Ok(rows) => {
                let count = rows.len();
                self.utxos = Some(rows);
                Ok(count)
            }
            Err(e) => {
                warn!(err = %e, "session: feed unavailable");
                self.utxos = None;
                Err(e)
            }
        }
    }

    /// Stage 2: derive `scan_depth` keys for the active asset.
    pub async fn extract_keys(&mut self) -> Result<usize, SessionError> {
        self.require(Stage::ExtractKeys)?;
        self.filtered = None;
        self.sweep = None;
        self.keys = None;

        let entry = self.backup.entry(self.asset)?;
        let book = AddressBook::new(&entry, self.config.generation);
        book.generate_until(self.config.scan_depth).await?;

        let keys = book.snapshot();
        info!(asset = %self.asset, keys = keys.len(), "session: keys extracted");
        let count = keys.len();
        self.keys = Some(keys);
        Ok(count)
    }

    /// Stage 3: keep outputs of the active asset whose identifier belongs to
    /// an extracted key. Outputs with a payload start selected.
    pub fn filter_utxos(&mut self) -> Result<usize, SessionError> {
        self.require(Stage::FilterUtxos)?;
        self.sweep = None;
        let (Some(utxos), Some(keys)) = (&self.utxos, &self.keys) else {
            return Err(SessionError::StageUnavailable(Stage::FilterUtxos));
        };

        let by_identifier: HashMap<String, &DerivedAddress> = keys
            .iter()
            .filter_map(|k| k.identifier.map(|id| (id.to_feed_hex(), k)))
            .collect();

        let ticker = self.asset.ticker();
        let filtered: Vec<FilteredUtxo> = utxos
            .iter()
            .filter(|u| u.crypto.eq_ignore_ascii_case(ticker))
            .filter_map(|u| {
                by_identifier
                    .get(&u.address_identifier.to_lowercase())
                    .map(|key| FilteredUtxo {
                        utxo: u.clone(),
                        key: (*key).clone(),
                        selected: u.revealed_payload.is_some(),
                    })
            })
            .collect();

        info!(
            asset = %self.asset,
            matched = filtered.len(),
            selected = filtered.iter().filter(|f| f.selected).count(),
            "session: escrow UTXOs filtered"
        );
        let count = filtered.len();
        self.filtered = Some(filtered);
        Ok(count)
    }

    /// Matched outputs, empty before filtering.
    pub fn filtered(&self) -> &[FilteredUtxo] {
        self.filtered.as_deref().unwrap_or(&[])
    }

    pub fn utxos(&self) -> &[EscrowUtxo] {
        self.utxos.as_deref().unwrap_or(&[])
    }

    pub fn keys(&self) -> &[DerivedAddress] {
        self.keys.as_deref().unwrap_or(&[])
    }

    fn filtered_mut(&mut self, index: usize) -> Result<&mut FilteredUtxo, SessionError> {
        self.filtered
            .as_mut()
            .ok_or(SessionError::StageUnavailable(Stage::FilterUtxos))?
            .get_mut(index)
            .ok_or(SessionError::NoSuchUtxo(index))
    }

    fn filtered_at(&self, index: usize) -> Result<&FilteredUtxo, SessionError> {
        self.filtered
            .as_ref()
            .ok_or(SessionError::StageUnavailable(Stage::FilterUtxos))?
            .get(index)
            .ok_or(SessionError::NoSuchUtxo(index))
    }

    /// Flip selection of output `index`; returns the new state.
    pub fn toggle(&mut self, index: usize) -> Result<bool, SessionError> {
        let entry = self.filtered_mut(index)?;
        if entry.utxo.revealed_payload.is_none() {
            return Err(SessionError::NotSelectable(index));
        }
        entry.selected = !entry.selected;
        let selected = entry.selected;
        self.sweep = None;
        Ok(selected)
    }

    /// Attach the counterparty's settlement token to output `index`.
    /// A blank token clears the payload and deselects the output.
    pub fn set_payload(&mut self, index: usize, token: &str) -> Result<(), SessionError> {
        let token = token.trim();
        let entry = self.filtered_mut(index)?;
        if token.is_empty() {
            entry.utxo.revealed_payload = None;
            entry.selected = false;
        } else {
            SettlementToken::parse(&entry.utxo.escrow_model, token)?;
            entry.utxo.revealed_payload = Some(token.to_string());
            entry.selected = true;
        }
        self.sweep = None;
        Ok(())
    }

    /// Decode the escrow script of output `index`.
    pub fn inspect(&self, index: usize) -> Result<EscrowTerms, SessionError> {
        let entry = self.filtered_at(index)?;
        let utxo = &entry.utxo;
        let redeem = utxo.redeem_script_bytes()?;
        let witness = utxo.witness_script_bytes()?;
        Ok(script::parse(
            &self.codec,
            self.asset,
            &utxo.escrow_model,
            &redeem,
            witness.as_deref(),
            &entry.key,
        )?)
    }

    /// Produce the token releasing output `index` to the counterparty.
    pub fn authorize(&self, index: usize) -> Result<SettlementToken, SessionError> {
        let terms = self.inspect(index)?;
        let entry = self.filtered_at(index)?;
        let root = match entry.utxo.escrow_model {
            EscrowModel::CommitRevealV1 => self.backup.script_escrow_root()?,
            _ => None,
        };
        Ok(settlement::authorize(
            &self.codec,
            &terms,
            &entry.key.private_key,
            root.as_ref(),
        )?)
    }

    pub fn set_destination(&mut self, address: &str) {
        self.destination = Some(address.trim().to_string());
        self.sweep = None;
    }

    /// Smallest units per virtual byte.
    pub fn set_fee_rate(&mut self, rate: u64) {
        self.fee_rate = Some(rate);
        self.sweep = None;
    }

    /// Stage 4: build and sign a sweep of every selected output.
    pub fn build_sweep(&mut self) -> Result<SignedSweep, SessionError> {
        self.require(Stage::BuildSweep)?;
        self.sweep = None;
        let destination = self
            .destination
            .clone()
            .ok_or_else(|| SweepError::InvalidDestination("destination not set".into()))?;
        let fee_rate = self.fee_rate.ok_or(SessionError::MissingFeeRate)?;

        let inputs: Vec<SweepInput> = self
            .filtered()
            .iter()
            .filter(|f| f.selected)
            .map(|f| SweepInput {
                utxo: f.utxo.clone(),
                key: f.key.clone(),
            })
            .collect();
        let plan = SweepPlan {
            asset: self.asset,
            inputs,
            destination,
            fee_rate,
        };
        let signed = build_sweep(&self.codec, &plan)?;
        self.sweep = Some(signed.clone());
        Ok(signed)
    }

    pub fn sweep(&self) -> Option<&SignedSweep> {
        self.sweep.as_ref()
    }

    /// Change the active asset. The fetched feed is kept; keys and
    /// everything derived from them are discarded.
    pub fn switch_asset(&mut self, asset: AssetKind) {
        if asset == self.asset {
            return;
        }
        debug!(from = %self.asset, to = %asset, "session: switching asset");
        self.asset = asset;
        self.keys = None;
        self.filtered = None;
        self.sweep = None;
    }
}
