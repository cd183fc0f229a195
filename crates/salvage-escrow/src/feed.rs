//! Escrow UTXO feed.
//!
//! The feed is a CSV file with a header row and the columns
//! `crypto, addressIdentifier, txid, vout, value, escrowModel,
//! revealedPayload, redeemScript, witnessScript`. Values are never quoted.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

use salvage_core::AssetKind;

use crate::error::{EscrowError, FeedError};

/// Minimum number of data rows in a healthy feed.
pub const DEFAULT_MIN_FEED_ROWS: usize = 10;

/// Columns up to and including `redeemScript` are mandatory.
const REQUIRED_COLUMNS: usize = 8;

/// Script template an escrow output was created with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EscrowModel {
    /// BCH escrow released by an `OP_CHECKDATASIG` signature.
    CheckDataSigV1,
    /// Escrow released by revealing a hash preimage.
    CommitRevealV1,
    /// Anything else, kept verbatim.
    Unknown(String),
}

impl EscrowModel {
    pub fn parse(s: &str) -> Self {
        match s {
            "checkdatasig_v1" => EscrowModel::CheckDataSigV1,
            "commit_reveal_v1" => EscrowModel::CommitRevealV1,
            other => EscrowModel::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EscrowModel::CheckDataSigV1 => "checkdatasig_v1",
            EscrowModel::CommitRevealV1 => "commit_reveal_v1",
            EscrowModel::Unknown(s) => s,
        }
    }

    /// Fail for models this tool cannot decode.
    pub fn ensure_known(&self) -> Result<(), EscrowError> {
        match self {
            EscrowModel::Unknown(s) => Err(EscrowError::UnknownModel(s.clone())),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for EscrowModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unspent escrow output from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowUtxo {
    /// Asset ticker as written in the feed.
    pub crypto: String,
    /// `"00" ‖ hex(hash160)`, compared verbatim against derived addresses.
    pub address_identifier: String,
    pub txid: String,
    pub vout: u32,
    /// Output value in the chain's smallest unit.
    pub value: u64,
    pub escrow_model: EscrowModel,
    /// Settlement token already published by the counterparty, if any.
    pub revealed_payload: Option<String>,
    /// Hex.
    pub redeem_script: String,
    /// Hex; present for segwit escrows.
    pub witness_script: Option<String>,
}

impl EscrowUtxo {
    /// Parsed ticker, `None` for assets this tool does not know.
    pub fn asset(&self) -> Option<AssetKind> {
        AssetKind::from_ticker(&self.crypto).ok()
    }

    pub fn outpoint(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }

    pub fn redeem_script_bytes(&self) -> Result<Vec<u8>, EscrowError> {
        hex::decode(&self.redeem_script)
            .map_err(|e| EscrowError::MalformedScript(format!("redeem script: {e}")))
    }

    pub fn witness_script_bytes(&self) -> Result<Option<Vec<u8>>, EscrowError> {
        self.witness_script
            .as_deref()
            .map(|s| {
                hex::decode(s)
                    .map_err(|e| EscrowError::MalformedScript(format!("witness script: {e}")))
            })
            .transpose()
    }
}

/// Where to read the feed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Url(String),
    File(PathBuf),
    Text(String),
}

impl FeedSource {
    /// Read the raw CSV. A URL is fetched with a single GET, no retry.
    pub async fn read(&self) -> Result<String, FeedError> {
        match self {
            FeedSource::Url(url) => {
                info!(%url, "feed: downloading");
                let body = reqwest::get(url.as_str()).await?.text().await?;
                Ok(body)
            }
            FeedSource::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            FeedSource::Text(text) => Ok(text.clone()),
        }
    }

    /// Read and parse.
    pub async fn load(&self, min_rows: usize) -> Result<Vec<EscrowUtxo>, FeedError> {
        let text = self.read().await?;
        parse_csv(&text, min_rows)
    }
}

/// Parse feed CSV. Blank lines are ignored.
///
/// An XML error page (body starting with `<?`) or fewer than `min_rows`
/// data rows is reported as [`FeedError::Unavailable`].
pub fn parse_csv(text: &str, min_rows: usize) -> Result<Vec<EscrowUtxo>, FeedError> {
    if text.starts_with("<?") {
        return Err(FeedError::Unavailable);
    }

    let mut rows = Vec::new();
    for (i, raw) in text.lines().enumerate().skip(1) {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_row(line, i + 1)?);
    }

    if rows.len() < min_rows {
        debug!(rows = rows.len(), min_rows, "feed: too few rows");
        return Err(FeedError::Unavailable);
    }
    info!(rows = rows.len(), "feed: parsed");
    Ok(rows)
}

fn parse_row(line: &str, line_no: usize) -> Result<EscrowUtxo, FeedError> {
    let malformed = |reason: String| FeedError::MalformedRow {
        line: line_no,
        reason,
    };

    let cols: Vec<&str> = line.split(',').map(str::trim).collect();
    if cols.len() < REQUIRED_COLUMNS {
        return Err(malformed(format!(
            "expected at least {REQUIRED_COLUMNS} columns, got {}",
            cols.len()
        )));
    }

    let vout = cols[3]
        .parse::<u32>()
        .map_err(|_| malformed(format!("bad vout {:?}", cols[3])))?;
    let value = cols[4]
        .parse::<u64>()
        .map_err(|_| malformed(format!("bad value {:?}", cols[4])))?;

    Ok(EscrowUtxo {
        crypto: cols[0].to_string(),
        address_identifier: cols[1].to_string(),
        txid: cols[2].to_string(),
        vout,
        value,
        escrow_model: EscrowModel::parse(cols[5]),
        revealed_payload: non_empty(cols[6]),
        redeem_script: cols[7].to_string(),
        witness_script: cols.get(8).and_then(|s| non_empty(s)),
    })
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
