//! salvage: recover funds from a non-custodial wallet backup.
//!
//! Re-derives wallet addresses and private keys from a backup file and
//! sweeps escrowed UTXOs once a settlement token is available.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use salvage_core::AssetKind;
use salvage_escrow::{FeedSource, Stage, SweepSession};
use salvage_wallet::{AddressBook, WalletBackup};

mod config;

use config::RecoveryConfig;

const ETH_ESCROW_INSTRUCTIONS: &str = "\
Ethereum escrows are held in an on-chain smart contract which you can call
directly with your own wallet.

How to recover ETH from escrow:
  1. Find the transaction that deposited into the escrow contract. The
     method called is `createEscrow`.
  2. Decode its input data with a block explorer such as Etherscan and note:
       - the trade ID (parameter 1)
       - the seller's address (parameter 2)
       - the buyer's address (parameter 3)
       - the escrow value in wei (parameter 4)
       - the escrow fee (parameter 5)
  3. Run `salvage export --asset ETH` to export the private key of your
     Ethereum address and import it into a self-custodial wallet.
  4. Call the relevant contract function:
       - `release` to pay the buyer, as the seller
       - `sellerCancel` to refund yourself, as the seller
       - `buyerCancel` to refund the seller, as the buyer
  5. Pass the values from step 2 exactly as they appear in `createEscrow`.
  6. Wait for the transaction to confirm.
";

/// Wallet backup recovery tool.
#[derive(Parser)]
#[command(name = "salvage")]
#[command(version, about = "Recover addresses, keys and escrowed funds from a wallet backup.")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a backup file.
    Info(BackupArgs),
    /// List derived addresses.
    Addresses(AddressesArgs),
    /// Find derived addresses containing a string.
    Search(SearchArgs),
    /// Write private keys to `<prefix>_<TOKEN>_Seeds.txt`.
    Export(ExportArgs),
    /// Escrow recovery subcommands.
    Escrow {
        #[command(subcommand)]
        action: EscrowAction,
    },
}

#[derive(Subcommand)]
enum EscrowAction {
    /// List escrow UTXOs controlled by the backup.
    List(EscrowArgs),
    /// Decode the escrow script of one matched UTXO.
    Inspect(IndexArgs),
    /// Produce the settlement token for the counterparty.
    Authorize(IndexArgs),
    /// Sign a transaction sweeping the selected escrow UTXOs.
    Sweep(SweepArgs),
}

#[derive(Args)]
struct BackupArgs {
    /// Path to the wallet backup JSON.
    #[arg(short, long)]
    backup: PathBuf,
}

#[derive(Args)]
struct WalletArgs {
    #[command(flatten)]
    backup: BackupArgs,

    /// Asset ticker (BTC, LTC, DASH, BCH, ETH).
    #[arg(short, long)]
    asset: AssetKind,
}

#[derive(Args)]
struct AddressesArgs {
    #[command(flatten)]
    wallet: WalletArgs,

    /// Number of addresses to derive.
    #[arg(short = 'n', long, default_value = "100")]
    count: usize,

    /// Also print serialized private keys.
    #[arg(long)]
    show_keys: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    wallet: WalletArgs,

    /// Case-insensitive substring of the address.
    #[arg(short, long)]
    query: String,

    /// Number of addresses to search (default: escrow scan depth).
    #[arg(short, long)]
    depth: Option<usize>,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    wallet: WalletArgs,

    /// Output directory (default: configured export directory).
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct EscrowArgs {
    #[command(flatten)]
    wallet: WalletArgs,

    /// Read the UTXO feed from a local CSV file instead of downloading it.
    #[arg(long)]
    feed_file: Option<PathBuf>,

    /// Download the UTXO feed from this URL (default: configured feed URL).
    #[arg(long, conflicts_with = "feed_file")]
    feed_url: Option<String>,
}

#[derive(Args)]
struct IndexArgs {
    #[command(flatten)]
    escrow: EscrowArgs,

    /// Position in the matched UTXO list.
    #[arg(short, long)]
    index: usize,
}

#[derive(Args)]
struct SweepArgs {
    #[command(flatten)]
    escrow: EscrowArgs,

    /// Destination address.
    #[arg(short, long)]
    to: String,

    /// Fee rate in smallest units per virtual byte.
    #[arg(short, long)]
    fee_rate: u64,

    /// Settlement token for a UTXO, as `INDEX=TOKEN`. Repeatable.
    #[arg(short, long = "payload", value_parser = parse_payload)]
    payloads: Vec<(usize, String)>,

    /// Leave a UTXO out of the sweep. Repeatable.
    #[arg(long)]
    deselect: Vec<usize>,
}

fn parse_payload(s: &str) -> Result<(usize, String), String> {
    let (index, token) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=TOKEN, got {s:?}"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|_| format!("invalid index {index:?}"))?;
    Ok((index, token.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RecoveryConfig::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    match cli.command {
        Commands::Info(args) => backup_info(args),
        Commands::Addresses(args) => list_addresses(&config, args).await,
        Commands::Search(args) => search_addresses(&config, args).await,
        Commands::Export(args) => export_keys(&config, args).await,
        Commands::Escrow { action } => match action {
            EscrowAction::List(args) => escrow_list(&config, args).await,
            EscrowAction::Inspect(args) => escrow_inspect(&config, args).await,
            EscrowAction::Authorize(args) => escrow_authorize(&config, args).await,
            EscrowAction::Sweep(args) => escrow_sweep(&config, args).await,
        },
    }
}

fn load_backup(args: &BackupArgs) -> Result<WalletBackup> {
    WalletBackup::load(&args.backup)
        .with_context(|| format!("Failed to load backup: {}", args.backup.display()))
}

fn open_book(config: &RecoveryConfig, args: &WalletArgs) -> Result<AddressBook> {
    let backup = load_backup(&args.backup)?;
    let entry = backup
        .entry(args.asset)
        .with_context(|| format!("No {} wallet in backup", args.asset))?;
    Ok(AddressBook::new(&entry, config.generation()))
}

/// Print the assets and export metadata of a backup.
fn backup_info(args: BackupArgs) -> Result<()> {
    let backup = load_backup(&args)?;
    if let Some(version) = backup.wallet_version() {
        println!("Wallet version: {version}");
    }
    if let Some(created) = backup.created_at() {
        println!("Exported:       {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("Wallets:");
    for record in backup.records() {
        let supported = AssetKind::from_ticker(&record.token).is_ok();
        println!(
            "  {:<5} {}",
            record.token,
            if supported { "" } else { "(unsupported)" }
        );
    }
    Ok(())
}

async fn list_addresses(config: &RecoveryConfig, args: AddressesArgs) -> Result<()> {
    let book = open_book(config, &args.wallet)?;
    book.generate_until(args.count)
        .await
        .context("Failed to derive addresses")?;
    for address in book.snapshot().iter().take(args.count) {
        if args.show_keys {
            println!(
                "{:>6}  {}  {}",
                address.index, address.display_address, address.serialized_private_key
            );
        } else {
            println!("{:>6}  {}", address.index, address.display_address);
        }
    }
    Ok(())
}

async fn search_addresses(config: &RecoveryConfig, args: SearchArgs) -> Result<()> {
    let book = open_book(config, &args.wallet)?;
    let depth = args.depth.unwrap_or(config.escrow.scan_depth);
    book.generate_until(depth)
        .await
        .context("Failed to derive addresses")?;
    let hits = book.search(&args.query);
    if hits.is_empty() {
        println!("No match in the first {depth} addresses.");
    }
    for address in hits {
        println!(
            "{:>6}  {}  {}",
            address.index, address.display_address, address.serialized_private_key
        );
    }
    Ok(())
}

async fn export_keys(config: &RecoveryConfig, args: ExportArgs) -> Result<()> {
    let book = open_book(config, &args.wallet)?;
    let dir = args.out.unwrap_or_else(|| config.export.output_dir.clone());
    let path = book
        .write_export(&dir, &config.export.file_prefix)
        .await
        .context("Failed to export keys")?;
    println!("Wrote {} keys to {}", book.len(), path.display());
    Ok(())
}

/// Run the fetch, extract and filter stages. `None` for ETH, which has no
/// script escrows.
async fn open_session(config: &RecoveryConfig, args: &EscrowArgs) -> Result<Option<SweepSession>> {
    let asset = args.wallet.asset;
    if asset == AssetKind::Eth {
        print!("{ETH_ESCROW_INSTRUCTIONS}");
        return Ok(None);
    }
    let backup = load_backup(&args.wallet.backup)?;
    let mut session = SweepSession::new(backup, asset, config.session());

    let source = match (&args.feed_file, &args.feed_url) {
        (Some(path), _) => FeedSource::File(path.clone()),
        (None, Some(url)) => FeedSource::Url(url.clone()),
        (None, None) => FeedSource::Url(config.escrow.feed_url.clone()),
    };
    let rows = session
        .fetch_utxos(&source)
        .await
        .with_context(|| format!("Failed to {}", Stage::FetchUtxos))?;
    let keys = session
        .extract_keys()
        .await
        .with_context(|| format!("Failed to {}", Stage::ExtractKeys))?;
    let matched = session
        .filter_utxos()
        .with_context(|| format!("Failed to {}", Stage::FilterUtxos))?;
    info!(rows, keys, matched, "escrow session ready");
    Ok(Some(session))
}

fn print_filtered(session: &SweepSession) {
    if session.filtered().is_empty() {
        println!("No {} escrow UTXOs belong to this backup.", session.asset());
        return;
    }
    for (i, f) in session.filtered().iter().enumerate() {
        println!(
            "[{i}] {} {:>12}  {}  key #{}  {}{}",
            if f.selected { "*" } else { " " },
            f.utxo.value,
            f.utxo.outpoint(),
            f.key.index,
            f.utxo.escrow_model,
            if f.utxo.revealed_payload.is_some() {
                "  (payload)"
            } else {
                ""
            }
        );
    }
}

async fn escrow_list(config: &RecoveryConfig, args: EscrowArgs) -> Result<()> {
    if let Some(session) = open_session(config, &args).await? {
        print_filtered(&session);
    }
    Ok(())
}

async fn escrow_inspect(config: &RecoveryConfig, args: IndexArgs) -> Result<()> {
    let Some(session) = open_session(config, &args.escrow).await? else {
        return Ok(());
    };
    let terms = session
        .inspect(args.index)
        .with_context(|| format!("Failed to decode escrow #{}", args.index))?;
    println!("Escrow model: {}", terms.model());
    for (label, value) in terms.describe() {
        println!("{label:<30} {value}");
    }
    Ok(())
}

async fn escrow_authorize(config: &RecoveryConfig, args: IndexArgs) -> Result<()> {
    let Some(session) = open_session(config, &args.escrow).await? else {
        return Ok(());
    };
    let token = session
        .authorize(args.index)
        .with_context(|| format!("Failed to authorize escrow #{}", args.index))?;
    println!("Send this settlement token to your counterparty:");
    println!("{token}");
    Ok(())
}

async fn escrow_sweep(config: &RecoveryConfig, args: SweepArgs) -> Result<()> {
    let Some(mut session) = open_session(config, &args.escrow).await? else {
        return Ok(());
    };
    for (index, token) in &args.payloads {
        session
            .set_payload(*index, token)
            .with_context(|| format!("Invalid settlement token for escrow #{index}"))?;
    }
    for index in &args.deselect {
        if session.filtered().get(*index).is_some_and(|f| f.selected) {
            session.toggle(*index)?;
        }
    }
    print_filtered(&session);
    if !session.filtered().iter().any(|f| f.selected) {
        bail!("Nothing to sweep: no escrow UTXO has a settlement token");
    }

    session.set_destination(&args.to);
    session.set_fee_rate(args.fee_rate);
    let sweep = session
        .build_sweep()
        .with_context(|| format!("Failed to {}", Stage::BuildSweep))?;

    println!();
    println!("Destination: {}", sweep.destination.address());
    println!("Inputs:      {}", sweep.transaction.input.len());
    println!("Output:      {}", sweep.output_value);
    println!("Fee:         {} ({} vbytes)", sweep.fee, sweep.vsize);
    println!("Txid:        {}", sweep.txid);
    println!();
    println!("{}", sweep.hex);
    Ok(())
}
