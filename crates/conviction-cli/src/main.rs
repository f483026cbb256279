//! Command-line interface for conviction-rs
//!
//! Runs analysis passes against synthetic providers by default; `--live`
//! switches market data, fundamentals and filings to the public Yahoo and
//! EDGAR adapters. State persists as a JSON file under the data directory
//! unless `--memory` is set.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

use conviction_analysis::{
    AnalysisConfig, AnalysisOutcome, AnalyzeOptions, BatchEventHandler, BatchOptions, BatchRunner,
    EntityAnalyzer, EntityOutcome, JobStatus, ProviderSet, Verdict, VerdictStore,
    standard_registry,
};
use conviction_core::KeyValueStore;
use conviction_engine::{CacheStore, EngineConfig, JsonFileStore, MemoryStore, ToolExecutor};

const DEFAULT_DATA_DIR: &str = "conviction-data";

#[derive(Parser, Debug)]
#[command(name = "conviction")]
#[command(about = "Multi-source research aggregation with scored verdicts", version)]
struct Cli {
    /// Directory for the persistent state file
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Keep all state in memory, nothing persisted
    #[arg(long, global = true, conflicts_with = "data_dir")]
    memory: bool,

    /// Use live Yahoo/EDGAR adapters instead of synthetic providers
    #[arg(long, global = true)]
    live: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one entity and print its verdict
    Analyze {
        symbol: String,
        /// Score even when mandatory inputs are missing
        #[arg(long)]
        allow_missing: bool,
    },
    /// Analyze a list of entities sequentially with pacing
    Batch {
        /// Symbols to analyze
        symbols: Vec<String>,
        /// File with one symbol per line, '#' starts a comment
        #[arg(long, value_name = "FILE")]
        watchlist: Option<PathBuf>,
        /// Milliseconds to pause between entities
        #[arg(long, value_name = "MS")]
        pacing_ms: Option<u64>,
        /// Skip entities whose stored verdict is still recent
        #[arg(long)]
        skip_fresh: bool,
        /// Score entities even when mandatory inputs are missing
        #[arg(long)]
        allow_missing: bool,
    },
    /// List stored verdicts, or show one in full
    Verdicts { symbol: Option<String> },
    /// List the registered capabilities
    Capabilities,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    conviction_utils::init_tracing_with(cli.verbose);

    match &cli.command {
        Command::Analyze {
            symbol,
            allow_missing,
        } => cmd_analyze(&cli, symbol, *allow_missing).await,
        Command::Batch {
            symbols,
            watchlist,
            pacing_ms,
            skip_fresh,
            allow_missing,
        } => {
            cmd_batch(
                &cli,
                symbols,
                watchlist.as_deref(),
                *pacing_ms,
                *skip_fresh,
                *allow_missing,
            )
            .await
        }
        Command::Verdicts { symbol } => cmd_verdicts(&cli, symbol.as_deref()).await,
        Command::Capabilities => cmd_capabilities(),
    }
}

async fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    if cli.memory {
        tracing::debug!("using in-memory state");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let path = dir.join("store.json");
    tracing::debug!(path = %path.display(), "opening state file");
    let store = JsonFileStore::open(&path)
        .await
        .with_context(|| format!("opening state file {}", path.display()))?;
    Ok(Arc::new(store))
}

fn providers(cli: &Cli) -> ProviderSet {
    if cli.live {
        ProviderSet::live()
    } else {
        ProviderSet::synthetic()
    }
}

fn build_analyzer(
    cli: &Cli,
    store: Arc<dyn KeyValueStore>,
    verdicts: Arc<VerdictStore>,
) -> Arc<EntityAnalyzer> {
    let registry = Arc::new(standard_registry(providers(cli), Arc::clone(&verdicts)));
    let engine_config = EngineConfig::default();
    let cache = Arc::new(CacheStore::new(
        Arc::clone(&store),
        engine_config.cache_ttls.clone(),
    ));
    let executor = Arc::new(ToolExecutor::from_config(registry, cache, engine_config));
    let config = AnalysisConfig::default();
    Arc::new(EntityAnalyzer::new(executor, verdicts, store, config))
}

async fn cmd_analyze(cli: &Cli, symbol: &str, allow_missing: bool) -> anyhow::Result<()> {
    let store = open_store(cli).await?;
    let verdicts = Arc::new(VerdictStore::new(Arc::clone(&store)));
    let analyzer = build_analyzer(cli, store, verdicts);

    let options = AnalyzeOptions {
        allow_missing_inputs: allow_missing.then_some(true),
    };
    match analyzer.analyze_with_options(symbol, &options).await? {
        AnalysisOutcome::Scored(verdict) => print_verdict(&verdict),
        AnalysisOutcome::Skipped { missing } => {
            let names: Vec<&str> = missing.iter().map(|id| id.name()).collect();
            println!(
                "Skipped {}: mandatory inputs missing ({}). Rerun with --allow-missing to score anyway.",
                symbol.trim().to_uppercase(),
                names.join(", ")
            );
        }
    }
    Ok(())
}

async fn cmd_batch(
    cli: &Cli,
    symbols: &[String],
    watchlist: Option<&std::path::Path>,
    pacing_ms: Option<u64>,
    skip_fresh: bool,
    allow_missing: bool,
) -> anyhow::Result<()> {
    let watchlist_content = match watchlist {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading watchlist {}", path.display()))?,
        ),
        None => None,
    };
    let symbols = merge_symbols(symbols, watchlist_content.as_deref());
    if symbols.is_empty() {
        anyhow::bail!("no symbols to analyze; pass SYMBOLS or --watchlist FILE");
    }

    let store = open_store(cli).await?;
    let verdicts = Arc::new(VerdictStore::new(Arc::clone(&store)));
    let analyzer = build_analyzer(cli, store, verdicts);

    let runner =
        BatchRunner::new(analyzer).with_event_handler(Arc::new(PrintProgress));
    let options = BatchOptions {
        pacing: pacing_ms.map(Duration::from_millis),
        skip_fresh,
        analyze: AnalyzeOptions {
            allow_missing_inputs: allow_missing.then_some(true),
        },
    };

    let progress = runner.run(&symbols, &options).await;

    println!();
    println!("{}", batch_table(&progress.outcomes));
    let failed = progress.errors.len();
    println!(
        "Batch {:?}: {}/{} entities processed, {} failed.",
        progress.status, progress.completed, progress.total, failed
    );
    if progress.status == JobStatus::Failed {
        anyhow::bail!("every entity in the batch failed");
    }
    Ok(())
}

async fn cmd_verdicts(cli: &Cli, symbol: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(cli).await?;
    let verdicts = VerdictStore::new(store);

    match symbol {
        Some(symbol) => {
            let symbol = symbol.trim().to_uppercase();
            match verdicts.latest(&symbol).await? {
                Some(verdict) => print_verdict(&verdict),
                None => println!("No verdict stored for {symbol}."),
            }
        }
        None => {
            let all = verdicts.all().await?;
            if all.is_empty() {
                println!("No verdicts stored yet.");
            } else {
                println!("{}", verdict_table(&all));
            }
        }
    }
    Ok(())
}

fn cmd_capabilities() -> anyhow::Result<()> {
    // Declarations are static metadata; the synthetic set backs them fine.
    let verdicts = Arc::new(VerdictStore::new(Arc::new(MemoryStore::new())));
    let registry = standard_registry(ProviderSet::synthetic(), verdicts);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Capability", "Source class", "Enabled", "Description"]);
    for declaration in registry.declarations() {
        table.add_row(vec![
            declaration.name.to_string(),
            declaration.source_class.to_string(),
            if declaration.enabled { "yes" } else { "no" }.to_string(),
            declaration.description,
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Prints one line per entity as the batch advances.
struct PrintProgress;

#[async_trait]
impl BatchEventHandler for PrintProgress {
    async fn on_entity_start(&self, symbol: &str, index: usize, total: usize) {
        println!("[{}/{}] analyzing {symbol}...", index + 1, total);
    }

    async fn on_entity_done(&self, outcome: &EntityOutcome) {
        match outcome {
            EntityOutcome::Scored {
                symbol,
                score,
                timing_signal,
                alert,
            } => {
                let marker = if *alert { "  [ALERT]" } else { "" };
                println!("  {symbol}: score {score}, {timing_signal}{marker}");
            }
            EntityOutcome::Skipped { symbol, missing } => {
                println!("  {symbol}: skipped, missing {}", missing.join(", "));
            }
            EntityOutcome::SkippedFresh { symbol, age_hours } => {
                println!("  {symbol}: verdict still fresh ({age_hours:.1}h old)");
            }
            EntityOutcome::Failed { symbol, message } => {
                println!("  {symbol}: failed, {message}");
            }
        }
    }
}

fn print_verdict(verdict: &Verdict) {
    let now = Utc::now();
    println!();
    println!(
        "{}  score {}  {}",
        verdict.symbol, verdict.score, verdict.timing_signal
    );
    if verdict.alert {
        let reason = verdict.alert_reason.as_deref().unwrap_or("unspecified");
        println!("ALERT: {reason}");
    }
    if verdict.partial_inputs {
        println!("Computed from partial inputs.");
    }
    println!();
    println!("Thesis: {}", verdict.thesis_summary);
    println!("Risks:  {}", verdict.risk_summary);
    println!();
    println!(
        "Computed {} ({:.1}h ago){}",
        verdict.computed_at.format("%Y-%m-%d %H:%M %Z"),
        verdict.age_hours_at(now),
        if verdict.is_expired_at(now) {
            "  [STALE]"
        } else {
            ""
        }
    );
    if !verdict.input_fetched_at.is_empty() {
        println!("Inputs:");
        for (input, fetched_at) in &verdict.input_fetched_at {
            println!("  {input}: {}", fetched_at.format("%Y-%m-%d %H:%M %Z"));
        }
    }
}

fn verdict_table(verdicts: &[Verdict]) -> Table {
    let now = Utc::now();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Symbol", "Score", "Signal", "Alert", "Age", "Status",
        ]);
    for verdict in verdicts {
        table.add_row(vec![
            verdict.symbol.clone(),
            verdict.score.to_string(),
            verdict.timing_signal.to_string(),
            if verdict.alert { "yes" } else { "" }.to_string(),
            format!("{:.1}h", verdict.age_hours_at(now)),
            if verdict.is_expired_at(now) {
                "STALE"
            } else {
                "fresh"
            }
            .to_string(),
        ]);
    }
    table
}

fn batch_table(outcomes: &[EntityOutcome]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Symbol", "Result", "Score", "Signal", "Note"]);
    for outcome in outcomes {
        let row = match outcome {
            EntityOutcome::Scored {
                symbol,
                score,
                timing_signal,
                alert,
            } => vec![
                symbol.clone(),
                "scored".to_string(),
                score.to_string(),
                timing_signal.to_string(),
                if *alert { "alert" } else { "" }.to_string(),
            ],
            EntityOutcome::Skipped { symbol, missing } => vec![
                symbol.clone(),
                "skipped".to_string(),
                "-".to_string(),
                "-".to_string(),
                format!("missing {}", missing.join(", ")),
            ],
            EntityOutcome::SkippedFresh { symbol, age_hours } => vec![
                symbol.clone(),
                "fresh".to_string(),
                "-".to_string(),
                "-".to_string(),
                format!("verdict {age_hours:.1}h old"),
            ],
            EntityOutcome::Failed { symbol, message } => vec![
                symbol.clone(),
                "failed".to_string(),
                "-".to_string(),
                "-".to_string(),
                message.clone(),
            ],
        };
        table.add_row(row);
    }
    table
}

/// Merge positional symbols with watchlist lines, uppercased, first
/// occurrence wins.
fn merge_symbols(args: &[String], watchlist: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    let watchlist_lines = watchlist
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    for raw in args.iter().map(String::as_str).chain(watchlist_lines) {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }
        if seen.insert(symbol.clone()) {
            symbols.push(symbol);
        }
    }
    symbols
}
