//! spindex-tool - load sparse vector corpora, inspect them and time queries
//!
//! # Commands
//!
//! - `stats` - Load a JSONL corpus and print corpus and posting statistics
//! - `search` - Load a corpus, then run one query repeatedly on a backend
//!
//! # Examples
//!
//! ## Find the hot dimension of a SPLADE dump
//! ```bash
//! spindex-tool stats -i embeddings.jsonl
//! ```
//!
//! ## Compare backends on a query touching it
//! ```bash
//! spindex-tool search -i embeddings.jsonl -b mutable -q 2000:1.0,2839:1.0 -n 100
//! spindex-tool search -i embeddings.jsonl -b immutable -q 2000:1.0,2839:1.0 -n 100
//! ```

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use spindex_core::{
    BackendKind, IndexConfig, SearchResult, SearchStats, SparseIndex, SparseVector,
};

mod loader;

#[derive(Parser)]
#[command(name = "spindex-tool")]
#[command(version, about = "Exact top-k retrieval over sparse vectors")]
#[command(after_help = "Use 'spindex-tool <command> --help' for more information.")]
struct Cli {
    /// Index configuration (JSON, missing fields take defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print corpus and posting list statistics
    Stats {
        /// JSONL corpus, one `{"dim": weight}` object per line (omit if using --stdin)
        #[arg(short, long, required_unless_present = "stdin")]
        input: Option<PathBuf>,

        /// Read the corpus from stdin
        #[arg(long, default_value = "false")]
        stdin: bool,

        /// Skip malformed lines instead of failing
        #[arg(long, default_value = "false")]
        skip_invalid: bool,

        /// Compact before reporting, to include snapshot statistics
        #[arg(long, default_value = "false")]
        compact: bool,

        /// Print statistics as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run a query against one backend and report timing and work counters
    Search {
        /// JSONL corpus, one `{"dim": weight}` object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Backend: storage, mutable or immutable
        #[arg(short, long, default_value = "immutable")]
        backend: BackendKind,

        /// Query as dim:weight pairs, e.g. 2000:1.0,2839:1.0
        #[arg(short, long, required_unless_present = "query_id")]
        query: Option<String>,

        /// Use a stored vector as the query
        #[arg(long, conflicts_with = "query")]
        query_id: Option<u32>,

        /// Number of hits to return
        #[arg(short = 'k', long, default_value = "10")]
        limit: usize,

        /// Run the query this many times
        #[arg(short = 'n', long, default_value = "1")]
        repeat: usize,

        /// Skip malformed lines instead of failing
        #[arg(long, default_value = "false")]
        skip_invalid: bool,

        /// Print hits and counters as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<IndexConfig> {
    let Some(path) = path else {
        return Ok(IndexConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: IndexConfig =
        serde_json::from_str(&content).context("Failed to parse config JSON")?;
    info!("Loaded config from {:?}: {:?}", path, config);
    Ok(config)
}

fn open_input(input: Option<&Path>, use_stdin: bool) -> Result<Box<dyn BufRead>> {
    if use_stdin {
        return Ok(Box::new(BufReader::new(io::stdin().lock())));
    }
    let path = input.context("No input file given")?;
    let file =
        File::open(path).with_context(|| format!("Failed to open input file: {:?}", path))?;
    Ok(Box::new(BufReader::new(file)))
}

fn load_index(
    config: IndexConfig,
    reader: impl BufRead,
    skip_invalid: bool,
) -> Result<SparseIndex> {
    let index = SparseIndex::new(config);
    loader::load_corpus(reader, &index, skip_invalid, 100_000)?;
    Ok(index)
}

fn run_stats(
    config: IndexConfig,
    input: Option<PathBuf>,
    use_stdin: bool,
    skip_invalid: bool,
    compact: bool,
    json: bool,
) -> Result<()> {
    let reader = open_input(input.as_deref(), use_stdin)?;
    let index = load_index(config, reader, skip_invalid)?;

    if compact {
        let start = Instant::now();
        index.compact()?;
        info!("Compacted in {:?}", start.elapsed());
    }

    let stats = index.statistics();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", stats);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_search(
    config: IndexConfig,
    input: PathBuf,
    backend: BackendKind,
    query: Option<String>,
    query_id: Option<u32>,
    limit: usize,
    repeat: usize,
    skip_invalid: bool,
    json: bool,
) -> Result<()> {
    let reader = open_input(Some(&input), false)?;
    let index = load_index(config, reader, skip_invalid)?;

    let query: SparseVector = match (query, query_id) {
        (Some(spec), _) => loader::parse_query(&spec)?,
        (None, Some(id)) => index
            .get(id)
            .with_context(|| format!("No live vector with id {}", id))?,
        (None, None) => anyhow::bail!("Either --query or --query-id is required"),
    };

    if backend == BackendKind::Immutable {
        let start = Instant::now();
        index.compact()?;
        info!("Compacted in {:?}", start.elapsed());
    }

    let mut total = Duration::ZERO;
    let mut totals = SearchStats::default();
    let mut last = SearchResult::default();
    for _ in 0..repeat.max(1) {
        let start = Instant::now();
        let result = index.query_with_stats(backend, &query, limit)?;
        total += start.elapsed();
        totals += result.stats;
        last = result;
    }
    let runs = repeat.max(1) as u32;

    if json {
        let output = serde_json::json!({
            "backend": format!("{:?}", backend).to_lowercase(),
            "runs": runs,
            "avg_micros": total.as_micros() as f64 / runs as f64,
            "hits": last.hits,
            "stats": last.stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (rank, hit) in last.hits.iter().enumerate() {
        println!("{:>3}. id={} score={:.6}", rank + 1, hit.id, hit.score);
    }
    info!(
        "{:?}: {} runs, avg {:?}, visited {} entries/run, scored {}, pruned {}, blocks skipped {}",
        backend,
        runs,
        total / runs,
        totals.entries_visited / runs as u64,
        last.stats.candidates_scored,
        last.stats.candidates_pruned,
        last.stats.blocks_skipped
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spindex_tool=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Stats {
            input,
            stdin,
            skip_invalid,
            compact,
            json,
        } => {
            run_stats(config, input, stdin, skip_invalid, compact, json)?;
        }
        Commands::Search {
            input,
            backend,
            query,
            query_id,
            limit,
            repeat,
            skip_invalid,
            json,
        } => {
            run_search(
                config,
                input,
                backend,
                query,
                query_id,
                limit,
                repeat,
                skip_invalid,
                json,
            )?;
        }
    }

    Ok(())
}
