use alloy::primitives::{Address, B256};
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use cycle_data::journal::Journal;
use cycle_data::ledger::RpcLedger;
use cycle_data::notify::AnyNotifier;
use cycle_data::price::fetch_native_price_usd;
use cycle_data::registry::load_wallets;
use cycle_data::store::Store;
use cycle_data::types::{TokenConfig, ERC20_TRANSFER_TOPIC0};
use cycle_data::LedgerSource;
use cycle_engine::fees::{format_amount, format_duration};
use cycle_engine::{
    Emitter, Monitor, MonitorConfig, Pacing, Phase, ReportStyle, TimestampResolver, WalletBook,
    WalletSnapshot,
};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Binance-Peg USDC on BNB Smart Chain.
const BSC_USDC: &str = "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d";

/// Attempts per replay chunk before giving up.
const REPLAY_ATTEMPTS: u32 = 3;

type LiveMonitor = Monitor<RpcLedger, AnyNotifier, Journal>;

#[derive(Debug, Clone)]
struct AppContext {
    db_path: String,
    rpc_url: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "swap-cycle-monitor")]
#[command(about = "Follows wallets through buy/sell swap cycles on an EVM chain")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[arg(long, global = true, default_value = "data/cycles.sqlite")]
    db_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow new blocks from the chain head.
    Watch(WatchArgs),
    /// Run the cycle pipeline over a historical block range.
    Replay(ReplayArgs),
    /// Show journaled events and completions.
    Status,
    /// Validate and print a wallet registry.
    Wallets(WalletsArgs),
}

/// Settings shared by `watch` and `replay`.
#[derive(Args, Debug, Clone)]
struct MonitorArgs {
    /// Wallet registry file (`address;name[;sell]` per line).
    #[arg(long, default_value = "wallets.txt")]
    wallets: PathBuf,

    /// Primary token contract.
    #[arg(long)]
    token: Address,

    /// Stablecoin contract.
    #[arg(long, default_value = BSC_USDC)]
    stable: Address,

    /// Transfer event signature of the primary token.
    #[arg(long, default_value = ERC20_TRANSFER_TOPIC0)]
    transfer_topic: B256,

    /// Transfer event signature of the stablecoin; defaults to `--transfer-topic`.
    #[arg(long)]
    stable_transfer_topic: Option<B256>,

    /// Cycles per wallet before its completion report.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    cycle_limit: u32,

    /// Attempts to fetch a block that is not yet available.
    #[arg(long, default_value_t = 5)]
    max_retries: u32,

    /// Delay between block fetch attempts.
    #[arg(long, default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Token precision when `decimals()` cannot be read.
    #[arg(long, default_value_t = 18)]
    decimals_fallback: u8,

    /// Append-only report file.
    #[arg(long, default_value = "logs/monitor.log")]
    log_file: PathBuf,

    /// CoinGecko id of the native currency.
    #[arg(long, default_value = "binancecoin")]
    price_coin: String,

    /// Most blocks requested per poll.
    #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    max_block_span: u64,

    #[arg(long, default_value = "ZKJ")]
    token_symbol: String,

    #[arg(long, default_value = "USDC")]
    stable_symbol: String,

    #[arg(long, default_value = "BNB")]
    native_symbol: String,

    /// Show times in UTC instead of local time.
    #[arg(long)]
    utc: bool,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[command(flatten)]
    monitor: MonitorArgs,

    /// First block to process; defaults to the block after the current head.
    #[arg(long)]
    from_block: Option<u64>,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    #[command(flatten)]
    monitor: MonitorArgs,

    #[arg(long)]
    start_block: u64,

    /// Last block (inclusive).
    #[arg(long)]
    end_block: u64,
}

#[derive(Args, Debug)]
struct WalletsArgs {
    #[arg(long, default_value = "wallets.txt")]
    wallets: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        db_path: cli.db_path,
        rpc_url: std::env::var("CYCLE_RPC_URL").ok(),
    };

    match cli.command {
        Commands::Watch(args) => handle_watch(&ctx, args).await,
        Commands::Replay(args) => handle_replay(&ctx, args).await,
        Commands::Status => handle_status(&ctx),
        Commands::Wallets(args) => handle_wallets(&args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn handle_watch(ctx: &AppContext, args: WatchArgs) -> Result<()> {
    let (mut monitor, head) = build_monitor(ctx, &args.monitor, args.from_block).await?;
    info!(head, from_block = monitor.next_block(), "watching for swaps");
    monitor.run().await;
    Ok(())
}

async fn handle_replay(ctx: &AppContext, args: ReplayArgs) -> Result<()> {
    if args.start_block > args.end_block {
        return Err(eyre!(
            "invalid range: start-block {} is greater than end-block {}",
            args.start_block,
            args.end_block
        ));
    }

    let (mut monitor, head) = build_monitor(ctx, &args.monitor, Some(args.start_block)).await?;
    if args.end_block > head {
        warn!(end_block = args.end_block, head, "replay range extends past chain head");
    }

    let span = args.monitor.max_block_span;
    let pb = ProgressBar::new(args.end_block - args.start_block + 1);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} blocks")
            .wrap_err("failed to create progress style")?
            .progress_chars("#>-"),
    );

    let mut applied = 0usize;
    let mut skipped = 0usize;
    let mut completions = 0usize;
    let mut chunk_start = args.start_block;
    while chunk_start <= args.end_block {
        let chunk_end = args
            .end_block
            .min(chunk_start.saturating_add(span - 1));

        let mut attempt = 0;
        let summary = loop {
            match monitor.process_range(chunk_start, chunk_end).await {
                Ok(summary) => break summary,
                Err(e) if attempt + 1 < REPLAY_ATTEMPTS => {
                    let backoff_ms = 500 * 2_u64.pow(attempt);
                    warn!(
                        chunk_start,
                        chunk_end,
                        attempt = attempt + 1,
                        backoff_ms,
                        error = %e,
                        "retrying failed chunk"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => {
                    pb.abandon_with_message("replay failed");
                    return Err(e).wrap_err_with(|| {
                        format!(
                            "blocks {chunk_start}..={chunk_end} failed after {REPLAY_ATTEMPTS} attempts"
                        )
                    });
                }
            }
        };

        applied += summary.applied;
        skipped += summary.skipped;
        completions += summary.completions;
        pb.inc(chunk_end - chunk_start + 1);

        match chunk_end.checked_add(1) {
            Some(next) => chunk_start = next,
            None => break,
        }
    }
    pb.finish_with_message("replay completed");

    println!("\n{}\n", wallet_table(&monitor.snapshot(), &args.monitor));
    info!(
        start_block = args.start_block,
        end_block = args.end_block,
        applied,
        skipped,
        completions,
        "replay finished"
    );
    Ok(())
}

fn handle_status(ctx: &AppContext) -> Result<()> {
    let store = Store::new(&ctx.db_path).wrap_err("failed to open SQLite store")?;
    let activity = store
        .wallet_activity()
        .wrap_err("failed to query wallet activity")?;
    let completions = store
        .completions()
        .wrap_err("failed to query completions")?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Wallet", "Address", "Buys", "Sells", "Last Block"]);
    for row in &activity {
        table.add_row(vec![
            row.wallet_name.clone(),
            row.wallet_address.clone(),
            row.buys.to_string(),
            row.sells.to_string(),
            row.last_block.to_string(),
        ]);
    }
    if activity.is_empty() {
        table.add_row(vec!["No events recorded", "", "", "", ""]);
    }
    println!("\n{}\n", table);

    let mut done = Table::new();
    done.load_preset(UTF8_BORDERS_ONLY);
    done.set_header(vec![
        "Wallet", "Cycles", "Spent", "Lost", "Fees ($)", "Duration", "Block",
    ]);
    for row in &completions {
        done.add_row(vec![
            row.wallet_name.clone(),
            row.cycles.to_string(),
            display_decimal_text(&row.total_stable_spent),
            display_decimal_text(&row.total_lost),
            display_decimal_text(&row.total_fees_display),
            row.duration_secs
                .map(format_duration)
                .unwrap_or_else(|| "N/A".to_string()),
            row.block_number.to_string(),
        ]);
    }
    if completions.is_empty() {
        done.add_row(vec!["No completions recorded", "", "", "", "", "", ""]);
    }
    println!("{}\n", done);

    info!(
        wallets = activity.len(),
        completions = completions.len(),
        db_path = %ctx.db_path,
        "status command finished"
    );
    Ok(())
}

fn handle_wallets(args: &WalletsArgs) -> Result<()> {
    let entries = load_wallets(&args.wallets)?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["#", "Name", "Address", "Starts"]);
    for (index, entry) in entries.iter().enumerate() {
        table.add_row(vec![
            (index + 1).to_string(),
            entry.name.clone(),
            format!("{:#x}", entry.address),
            if entry.starts_awaiting_sell {
                "awaiting sell".to_string()
            } else {
                "awaiting buy".to_string()
            },
        ]);
    }
    println!("\n{}\n", table);

    info!(wallets = entries.len(), path = %args.wallets.display(), "registry is valid");
    Ok(())
}

/// Wires the live collaborators into a monitor. Returns it with the head
/// block seen at startup.
///
/// Every failure here is fatal: the loop is never entered without a working
/// connection, a valid registry and an open journal.
async fn build_monitor(
    ctx: &AppContext,
    args: &MonitorArgs,
    from_block: Option<u64>,
) -> Result<(LiveMonitor, u64)> {
    let rpc_url = ctx
        .rpc_url
        .as_deref()
        .ok_or_else(|| eyre!("CYCLE_RPC_URL is required to read the chain"))?;

    let entries = load_wallets(&args.wallets)?;
    if entries.is_empty() {
        warn!(path = %args.wallets.display(), "wallet registry is empty");
    }
    let book = WalletBook::new(&entries, args.cycle_limit).wrap_err("invalid wallet registry")?;

    let ledger = RpcLedger::connect(rpc_url).await?;
    let head = ledger
        .head_block()
        .await
        .wrap_err("failed to read chain head")?;

    let token_decimals = token_decimals_or(&ledger, args.token, args.decimals_fallback).await;
    let stable_decimals = token_decimals_or(&ledger, args.stable, args.decimals_fallback).await;
    let native_price = match fetch_native_price_usd(&args.price_coin).await {
        Ok(price) => price,
        Err(e) => {
            warn!(error = %e, coin = %args.price_coin, "native price unavailable, fees shown as 0");
            Decimal::ZERO
        }
    };

    if let Some(parent) = Path::new(&ctx.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let store = Store::new(&ctx.db_path).wrap_err("failed to open SQLite store")?;
    let journal = Journal::open(&args.log_file, store).await?;

    let notifier = AnyNotifier::from_credentials(
        std::env::var("TELEGRAM_BOT_TOKEN").ok(),
        std::env::var("TELEGRAM_CHAT_ID").ok(),
    );
    if !notifier.is_enabled() {
        info!("TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set, completion reports stay local");
    }

    let style = ReportStyle {
        token_symbol: args.token_symbol.clone(),
        stable_symbol: args.stable_symbol.clone(),
        native_symbol: args.native_symbol.clone(),
        utc: args.utc,
    };
    let config = monitor_config(args, token_decimals, stable_decimals);

    info!(
        wallets = book.len(),
        cycle_limit = args.cycle_limit,
        token_decimals,
        stable_decimals,
        %native_price,
        "monitor configured"
    );

    let monitor = Monitor::new(
        ledger,
        book,
        TimestampResolver::new(args.max_retries, Duration::from_millis(args.retry_delay_ms)),
        Emitter::new(notifier, journal, native_price, style),
        config,
        from_block.unwrap_or(head.saturating_add(1)),
    );
    Ok((monitor, head))
}

/// Token settings with the precision read from each contract.
fn monitor_config(args: &MonitorArgs, token_decimals: u8, stable_decimals: u8) -> MonitorConfig {
    MonitorConfig {
        token: TokenConfig {
            address: args.token,
            transfer_topic: args.transfer_topic,
            decimals: token_decimals,
        },
        stable: TokenConfig {
            address: args.stable,
            transfer_topic: args.stable_transfer_topic.unwrap_or(args.transfer_topic),
            decimals: stable_decimals,
        },
        max_block_span: args.max_block_span,
        pacing: Pacing::default(),
    }
}

async fn token_decimals_or(ledger: &RpcLedger, token: Address, fallback: u8) -> u8 {
    match ledger.token_decimals(token).await {
        Ok(decimals) => decimals,
        Err(e) => {
            warn!(%token, fallback, error = %e, "decimals() lookup failed, using fallback");
            fallback
        }
    }
}

fn wallet_table(wallets: &[WalletSnapshot], args: &MonitorArgs) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Wallet".to_string(),
        "Phase".to_string(),
        "Cycles".to_string(),
        format!("Spent ({})", args.stable_symbol),
        format!("Lost ({})", args.stable_symbol),
        format!("Fees ({})", args.native_symbol),
        "Duration".to_string(),
        "Done".to_string(),
    ]);

    for wallet in wallets {
        table.add_row(vec![
            wallet.name.clone(),
            match wallet.phase {
                Phase::AwaitingBuy => "awaiting buy".to_string(),
                Phase::AwaitingSell => "awaiting sell".to_string(),
            },
            format!("{}/{}", wallet.cycle_count, args.cycle_limit),
            format_amount(wallet.total_stable_spent),
            format_amount(wallet.total_lost),
            wallet.total_fees_native.normalize().to_string(),
            wallet
                .duration_secs()
                .map(format_duration)
                .unwrap_or_else(|| "N/A".to_string()),
            if wallet.completed { "yes" } else { "no" }.to_string(),
        ]);
    }
    table
}

fn display_decimal_text(value: &str) -> String {
    value
        .parse::<Decimal>()
        .map(format_amount)
        .unwrap_or_else(|_| value.to_string())
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .wrap_err_with(|| format!("failed to create data directory {}", path.display()))?;
    Ok(())
}
