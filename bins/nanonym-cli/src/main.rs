//! nanonym-cli: command-line tools for NanoNym pseudonyms.
//!
//! Derives pseudonym addresses from a wallet seed, prepares stealth
//! payments for `nnym_` addresses, recovers the one-time account announced
//! by a notification, and inspects the encrypted pseudonym store.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use nanonym_core::account::{decode_account, encode_account};
use nanonym_core::mnemonic::{mnemonic_to_seed, seed_to_mnemonic};
use nanonym_core::stealth::{generate_ephemeral, parse_key_hex, recover, StealthPayment};
use nanonym_core::{derive, Ed25519KeyPair, NanoNymAddress, PaymentNotification, Raw, Seed};
use nanonym_wallet::{EncryptedFileStore, LedgerQuery, ManagerConfig, PseudonymStore, RpcLedger};
use tracing::{info, warn};

/// NanoNym command-line tools.
#[derive(Parser)]
#[command(name = "nanonym-cli")]
#[command(version, about = "Reusable stealth pseudonyms for the Nano ledger")]
struct Cli {
    /// Optional TOML config file. `NANONYM_*` variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed management subcommands.
    Seed {
        #[command(subcommand)]
        action: SeedAction,
    },
    /// Derive the pseudonym at an index.
    Derive(DeriveArgs),
    /// Decode a `nnym_` or `nano_` address.
    Decode(DecodeArgs),
    /// Prepare a stealth payment to a `nnym_` address.
    Pay(PayArgs),
    /// Recover the stealth account announced by a notification.
    Scan(ScanArgs),
    /// List stored pseudonyms and their stealth accounts.
    Balance(BalanceArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand)]
enum SeedAction {
    /// Generate a new wallet seed.
    New,
    /// Show the 24-word phrase for a hex seed.
    Phrase,
}

#[derive(Args)]
struct DeriveArgs {
    /// Pseudonym index.
    #[arg(short, long, default_value_t = 0)]
    index: u32,
}

#[derive(Args)]
struct DecodeArgs {
    address: String,
}

#[derive(Args)]
struct PayArgs {
    /// Recipient `nnym_` address.
    address: String,

    /// Hash of the send block, once published. Prints the notification.
    #[arg(long)]
    tx_hash: Option<String>,

    /// Amount sent in XNO (e.g. 1.5), included in the notification.
    #[arg(short, long)]
    amount: Option<String>,

    /// Optional memo for the recipient.
    #[arg(short, long)]
    memo: Option<String>,

    /// Hex ephemeral secret printed by an earlier run, to rebuild the same payment.
    #[arg(long)]
    ephemeral_secret: Option<String>,
}

#[derive(Args)]
struct ScanArgs {
    /// Pseudonym index the notification was delivered to.
    #[arg(short, long, default_value_t = 0)]
    index: u32,

    /// Notification JSON, or `@path` to read it from a file.
    notification: String,

    /// Query the node for the account state.
    #[arg(long)]
    query: bool,
}

#[derive(Args)]
struct BalanceArgs {
    /// Pseudonym store (default: <data_dir>/pseudonyms.nnym).
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Skip the node query and show stored state only.
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ManagerConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    init_logging(&config.log_level, &cli.log_format);

    match cli.command {
        Commands::Seed { action } => match action {
            SeedAction::New => seed_new(),
            SeedAction::Phrase => seed_phrase(),
        },
        Commands::Derive(args) => pseudonym_derive(args),
        Commands::Decode(args) => address_decode(args),
        Commands::Pay(args) => payment_prepare(args),
        Commands::Scan(args) => notification_scan(args, &config).await,
        Commands::Balance(args) => store_balance(args, &config).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Generate a seed and print its backup phrase.
fn seed_new() -> Result<()> {
    let seed = Seed::generate();
    let phrase = seed_to_mnemonic(&seed)?;

    println!("\n=== SEED CREATED ===");
    println!("\nSEED PHRASE (24 WORDS):");
    println!("  {phrase}");
    println!("\nAdvanced: hex seed = {}", hex::encode(seed.as_bytes()));
    println!("\nWARNING: This seed will NOT be shown again.");
    println!("Anyone with this seed can find and spend every payment to your pseudonyms.");

    let first = derive(&seed, 0)?;
    println!("\nFirst pseudonym: {}", NanoNymAddress::from_keys(&first).encode());
    Ok(())
}

fn seed_phrase() -> Result<()> {
    let seed = prompt_seed()?;
    println!("{}", seed_to_mnemonic(&seed)?);
    Ok(())
}

fn pseudonym_derive(args: DeriveArgs) -> Result<()> {
    let seed = prompt_seed()?;
    let keys = derive(&seed, args.index)
        .with_context(|| format!("Failed to derive pseudonym {}", args.index))?;
    let public = keys.public_keys();

    println!("Index:    {}", args.index);
    println!("Address:  {}", NanoNymAddress::from_keys(&keys).encode());
    println!("Fallback: {}", keys.spend.account());
    println!("Spend:    {}", hex::encode(public.spend));
    println!("View:     {}", hex::encode(public.view));
    println!("Notify:   {}", hex::encode(public.notify));
    Ok(())
}

fn address_decode(args: DecodeArgs) -> Result<()> {
    let input = args.address.trim();
    if input.starts_with("nano_") || input.starts_with("xrb_") {
        let key = decode_account(input).context("Invalid account address")?;
        println!("Type:       account");
        println!("Public key: {}", hex::encode(key));
        return Ok(());
    }

    let address = NanoNymAddress::decode(input).context("Invalid nnym address")?;
    println!("Type:     pseudonym (version {})", address.version());
    println!("Spend:    {}", hex::encode(address.spend_public()));
    println!("View:     {}", hex::encode(address.view_public()));
    println!("Notify:   {}", hex::encode(address.notify_public()));
    println!("Fallback: {}", encode_account(&address.spend_public()));
    Ok(())
}

fn payment_prepare(args: PayArgs) -> Result<()> {
    let recipient = NanoNymAddress::decode(args.address.trim()).context("Invalid nnym address")?;
    let amount = args
        .amount
        .as_deref()
        .map(Raw::from_xno_str)
        .transpose()
        .context("Invalid amount")?;
    let ephemeral = match args.ephemeral_secret.as_deref() {
        Some(secret) => Ed25519KeyPair::from_private(
            parse_key_hex(secret).context("Invalid ephemeral secret")?,
        ),
        None => generate_ephemeral(),
    };
    let payment = StealthPayment::with_ephemeral(&recipient, ephemeral)
        .context("Failed to derive stealth account")?;

    println!("\n=== STEALTH PAYMENT ===");
    println!("Pay to:        {}", payment.address());
    println!("Ephemeral key: {}", hex::encode(payment.ephemeral_public()));

    match args.tx_hash {
        Some(tx_hash) => {
            let notification =
                PaymentNotification::build(&payment.ephemeral_public(), tx_hash, amount, args.memo);
            notification.validate().context("Invalid notification")?;
            println!("\nNotification for {}:", hex::encode(recipient.notify_public()));
            println!("{}", notification.to_json());
        }
        None => {
            println!("Ephemeral secret: {}", hex::encode(payment.ephemeral.private_bytes()));
            println!("\nPublish the send block, then rerun with --tx-hash and --ephemeral-secret");
            println!("to build the notification. Keep the secret private and discard it afterwards.");
        }
    }
    Ok(())
}

async fn notification_scan(args: ScanArgs, config: &ManagerConfig) -> Result<()> {
    let payload = match args.notification.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read notification file: {path}"))?,
        None => args.notification,
    };
    let notification = PaymentNotification::from_json(&payload).context("Invalid notification")?;

    let seed = prompt_seed()?;
    let keys = derive(&seed, args.index)?;
    let stealth = recover(&keys, &notification.ephemeral_key()?)
        .context("Failed to recover stealth account")?;
    let address = stealth.account();
    info!(index = args.index, %address, "stealth account recovered");

    println!("Account:   {address}");
    println!("Tx:        {}", notification.tx_hash);
    if let Some(amount) = notification.amount_raw {
        println!("Claimed:   {amount} raw");
    }
    if let Some(memo) = &notification.memo {
        println!("Memo:      {memo}");
    }

    if args.query {
        let ledger = RpcLedger::new(&config.rpc_url, config.ledger_timeout())?;
        match ledger
            .account_state(&address)
            .await
            .with_context(|| format!("Node query failed: {}", ledger.endpoint()))?
        {
            Some(state) => {
                println!("Balance:   {} raw", state.balance);
                println!("Opened:    {}", state.open_block.is_some());
                if let Some(receivable) = state.receivable {
                    println!("Pending:   {receivable} raw");
                }
            }
            None => println!("Ledger:    not opened yet"),
        }
    }
    Ok(())
}

async fn store_balance(args: BalanceArgs, config: &ManagerConfig) -> Result<()> {
    let path = args.store.unwrap_or_else(|| config.store_path());
    if !path.exists() {
        bail!("Pseudonym store not found: {}", path.display());
    }
    let password = prompt_password("Store password")?;
    let store = EncryptedFileStore::open(&path, password.as_bytes())
        .context("Failed to open store (check password)")?;
    let mut pseudonyms = store.load_all().await.context("Failed to read store")?;

    if !args.offline {
        let ledger = RpcLedger::new(&config.rpc_url, config.ledger_timeout())?;
        for account in pseudonyms.iter_mut().flat_map(|p| p.stealth_accounts.iter_mut()) {
            match ledger.account_state(&account.address).await {
                Ok(state) => account.apply_state(state.as_ref()),
                Err(e) => warn!(address = %account.address, "balance query failed: {e}"),
            }
        }
    }

    let mut total = Raw::ZERO;
    for p in &pseudonyms {
        println!("\n[{}] {} ({:?})", p.index, p.label, p.status);
        println!("  {}", p.address.encode());
        for account in &p.stealth_accounts {
            println!(
                "    {}  {:>40} raw  {:?}",
                account.address,
                account.effective_balance(),
                account.ledger_status
            );
        }
        total = total.saturating_add(p.balance());
    }
    println!("\nTotal: {total} raw across {} pseudonyms", pseudonyms.len());
    Ok(())
}

/// Read a seed as a 24-word phrase or 64 hex characters, without echo.
fn prompt_seed() -> Result<Seed> {
    let input = prompt_password("Seed (24-word phrase or hex)")?;
    let trimmed = input.trim();
    if trimmed.split_whitespace().count() > 1 {
        mnemonic_to_seed(trimmed).context("Invalid mnemonic")
    } else {
        Seed::from_hex(trimmed).context("Invalid hex seed")
    }
}

/// Prompt for a secret securely (no echo).
fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(format!("{prompt}: ")).context("Failed to read input")
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `format = "json"` gives structured output; anything else is plain text.
/// `RUST_LOG` overrides the level.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
