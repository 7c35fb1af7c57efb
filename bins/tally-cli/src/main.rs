//! tally-cli — build, submit and track wallet transactions.
//!
//! Builds read a wallet snapshot and a transfer request from JSON files and
//! write the signed envelope as canonical JSON. Keys come from a key file or
//! are prompted for one at a time.

mod keys;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use tally_client::{
    ClientConfig, ConfirmationTracker, Resolution, SubmitClient, TrackRequest, TrackerConfig,
};
use tally_core::canonical;
use tally_core::constants::RETAIL_GROUP;
use tally_core::hash::tx_id;
use tally_wallet::{
    Envelope, KeyProvider, LegacyBillTransfer, LegacySingleTransfer, MemoryWallet, NoLocks,
    TransactionBuilder, TransferRequest, from_legacy_bill, from_legacy_single,
};

use crate::keys::{KeyFile, PromptKeys};

/// Tally command-line wallet.
#[derive(Parser)]
#[command(name = "tally-cli")]
#[command(version, about = "Build, submit and track Tally transactions.")]
struct Cli {
    /// Verifier base URL.
    #[arg(long, global = true, env = "TALLY_ENDPOINT")]
    endpoint: Option<String>,

    /// HTTP request timeout in seconds.
    #[arg(long, global = true, env = "TALLY_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and sign a transaction envelope.
    Build(BuildArgs),
    /// Print and check the transaction ids inside an envelope.
    Txid(EnvelopeArgs),
    /// Submit an envelope to the verifier.
    Submit(SubmitArgs),
    /// Query the status of a transaction once.
    Status(StatusArgs),
    /// Wait for a transaction to confirm.
    Track(TrackArgs),
}

/// Layout of the request file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RequestShape {
    Current,
    LegacySingle,
    LegacyBill,
}

#[derive(Args)]
struct BuildArgs {
    /// Wallet snapshot (JSON).
    #[arg(short, long)]
    wallet: PathBuf,

    /// Transfer request (JSON).
    #[arg(short, long)]
    request: PathBuf,

    /// Layout of the request file.
    #[arg(long, value_enum, default_value = "current")]
    shape: RequestShape,

    /// Key file with hex scalars. Prompts for each key when absent.
    #[arg(short, long)]
    keys: Option<PathBuf>,

    /// Where to write the envelope.
    #[arg(short, long)]
    out: PathBuf,
}

#[derive(Args)]
struct EnvelopeArgs {
    /// Envelope file written by `build`.
    envelope: PathBuf,
}

#[derive(Args)]
struct SubmitArgs {
    /// Envelope file written by `build`.
    envelope: PathBuf,

    /// Track confirmation after a successful submission.
    #[arg(long)]
    track: bool,

    /// Successes below this block height count as pending.
    #[arg(long, default_value = "0")]
    min_height: u64,
}

#[derive(Args)]
struct StatusArgs {
    tx_id: String,

    /// Group the transaction was submitted to.
    #[arg(short, long, default_value = RETAIL_GROUP)]
    group: String,
}

#[derive(Args)]
struct TrackArgs {
    tx_id: String,

    /// Group the transaction was submitted to.
    #[arg(short, long, default_value = RETAIL_GROUP)]
    group: String,

    /// Successes below this block height count as pending.
    #[arg(long, default_value = "0")]
    min_height: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let client_config = client_config(&cli)?;

    match cli.command {
        Commands::Build(args) => build(args).await,
        Commands::Txid(args) => txid(args),
        Commands::Submit(args) => submit(args, &client_config).await,
        Commands::Status(args) => status(args, &client_config).await,
        Commands::Track(args) => {
            let client = SubmitClient::new(&client_config).context("Failed to create HTTP client")?;
            track(client, args.tx_id, args.group, args.min_height).await
        }
    }
}

/// Environment defaults overridden by command-line flags.
fn client_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("Invalid client configuration")?;
    if let Some(endpoint) = &cli.endpoint {
        config.base_url = endpoint.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

/// Build, sign and write an envelope.
async fn build(args: BuildArgs) -> Result<()> {
    let wallet = MemoryWallet::from_json(&read_file(&args.wallet)?)
        .with_context(|| format!("Invalid wallet snapshot: {}", args.wallet.display()))?;
    let request = load_request(&read_file(&args.request)?, args.shape)
        .with_context(|| format!("Invalid request: {}", args.request.display()))?;

    let keys: Box<dyn KeyProvider> = match &args.keys {
        Some(path) => Box::new(KeyFile::load(path)?.into_ring()?),
        None => Box::new(PromptKeys),
    };

    let outcome = TransactionBuilder::from_request(request)
        .build(&wallet, &NoLocks, keys.as_ref())
        .await
        .context("Failed to build transaction")?;

    let bytes = outcome.envelope().encode().context("Failed to encode envelope")?;
    std::fs::write(&args.out, &bytes)
        .with_context(|| format!("Failed to write envelope: {}", args.out.display()))?;

    println!("\n=== TRANSACTION BUILT ===");
    println!("TxID: {}", outcome.tx_id);
    println!("Type: {:?}", outcome.transaction().tx_type);
    println!("Inputs: {}", outcome.consumed_units.len());
    println!("Credentials: {}", outcome.consumed_credentials.len());
    println!("Size: {} bytes", outcome.transaction().size);
    println!("Envelope: {}", args.out.display());
    Ok(())
}

/// Parse a request file in the given shape.
fn load_request(bytes: &[u8], shape: RequestShape) -> Result<TransferRequest> {
    let request = match shape {
        RequestShape::Current => canonical::decode::<TransferRequest>(bytes)?,
        RequestShape::LegacySingle => {
            from_legacy_single(canonical::decode::<LegacySingleTransfer>(bytes)?)?
        }
        RequestShape::LegacyBill => from_legacy_bill(canonical::decode::<LegacyBillTransfer>(bytes)?)?,
    };
    Ok(request)
}

/// Print each transaction id and check it against the transaction contents.
fn txid(args: EnvelopeArgs) -> Result<()> {
    let envelope = load_envelope(&args.envelope)?;
    if let Envelope::Aggregate(aggregate) = &envelope {
        if !aggregate.hash_matches().context("Failed to hash envelope")? {
            bail!("Aggregate hash does not match its transactions");
        }
    }
    for tx in envelope.transactions() {
        let derived = tx_id(tx).context("Failed to hash transaction")?;
        if derived != tx.tx_id {
            bail!("Transaction {} hashes to {derived}", tx.tx_id);
        }
        println!("{derived}");
    }
    Ok(())
}

/// Submit an envelope, optionally waiting for confirmation.
async fn submit(args: SubmitArgs, config: &ClientConfig) -> Result<()> {
    let envelope = load_envelope(&args.envelope)?;
    let client = SubmitClient::new(config).context("Failed to create HTTP client")?;
    let receipt = client
        .submit(&envelope)
        .await
        .context("Submission failed")?;

    println!("\n=== TRANSACTION SUBMITTED ===");
    println!("TxID: {}", receipt.tx_id);

    if args.track {
        let group = envelope.group_id().unwrap_or(RETAIL_GROUP).to_string();
        track(client, receipt.tx_id, group, args.min_height).await?;
    }
    Ok(())
}

async fn status(args: StatusArgs, config: &ClientConfig) -> Result<()> {
    let client = SubmitClient::new(config).context("Failed to create HTTP client")?;
    let report = client
        .status(&args.group, &args.tx_id)
        .await
        .context("Status query failed")?;
    println!("Status: {:?}", report.status);
    println!("Verified: {}", report.verified);
    println!("Block height: {}", report.block_height);
    if let Some(reason) = report.error_reason {
        println!("Error: {reason}");
    }
    Ok(())
}

/// Poll until the transaction resolves. The CLI has no push channel.
async fn track(client: SubmitClient, tx_id: String, group: String, min_height: u64) -> Result<()> {
    let config = TrackerConfig::from_env().context("Invalid tracker configuration")?;
    let tracker = ConfirmationTracker::new(config, Arc::new(client));
    tracker.start();
    info!(%tx_id, %group, min_height, "tracking confirmation");

    let outcome = tracker
        .track(TrackRequest {
            tx_id,
            group,
            min_height,
        })
        .await
        .context("Tracking failed")?;
    tracker.stop();

    match outcome.resolution {
        Resolution::Success {
            block_height,
            verified,
        } => {
            println!("\n=== TRANSACTION CONFIRMED ===");
            println!("TxID: {}", outcome.tx_id);
            println!("Block height: {block_height}");
            println!("Verified: {verified}");
            Ok(())
        }
        Resolution::Failed { reason } => bail!("Transaction {} failed: {reason}", outcome.tx_id),
    }
}

fn load_envelope(path: &Path) -> Result<Envelope> {
    Envelope::decode(&read_file(path)?)
        .with_context(|| format!("Invalid envelope: {}", path.display()))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}
