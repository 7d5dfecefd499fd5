use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tps_compression::{
    Compressed, EngineConfig, PatternStore, SubstitutionCompressor, TpsError, Trainer,
};

/// Lines compressed per progress-bar tick.
const BATCH_SIZE: usize = 256;

/// TPS (Token Pattern Substitution) tool for bracket-token streams
#[derive(Parser)]
#[command(name = "tps")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pattern store file
    #[arg(short, long, global = true, value_name = "FILE", default_value = "patterns.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine a corpus of token strings (one per line) into the pattern store
    Train {
        /// Corpus file (use '-' for stdin)
        #[arg(long, value_name = "FILE", default_value = "-")]
        corpus: String,

        /// Original texts, line-aligned with the corpus
        #[arg(long, value_name = "FILE")]
        originals: Option<String>,

        /// Minimum occurrences for a pattern
        #[arg(long, value_name = "N")]
        min_frequency: Option<u64>,

        /// Minimum tokens saved per substitution
        #[arg(long, value_name = "N")]
        min_gain: Option<usize>,
    },

    /// Replace known patterns with REF tokens, line by line
    Compress {
        /// Input file (use '-' for stdin)
        #[arg(short, long, value_name = "FILE", default_value = "-")]
        input: String,

        /// Output file (use '-' for stdout)
        #[arg(short, long, value_name = "FILE", default_value = "-")]
        output: String,

        /// Only use patterns tagged with this domain
        #[arg(short, long, value_name = "LABEL")]
        domain: Option<String>,

        /// Emit one JSON record per line with substitution metadata
        #[arg(long)]
        json: bool,
    },

    /// Resolve REF tokens back to their pattern text
    Expand {
        /// Input file (use '-' for stdin)
        #[arg(short, long, value_name = "FILE", default_value = "-")]
        input: String,

        /// Output file (use '-' for stdout)
        #[arg(short, long, value_name = "FILE", default_value = "-")]
        output: String,
    },

    /// List the highest-value stored patterns
    Top {
        /// Number of patterns to list
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Only list patterns tagged with this domain
        #[arg(short, long, value_name = "LABEL")]
        domain: Option<String>,
    },

    /// Show one stored pattern as JSON
    Get {
        /// Pattern id
        id: String,
    },

    /// Display aggregate statistics for the pattern store
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = if let Some(config_path) = &cli.config {
        load_config(config_path)?
    } else {
        EngineConfig::default()
    };

    match cli.command {
        Commands::Train {
            corpus,
            originals,
            min_frequency,
            min_gain,
        } => {
            train_command(
                &cli.store,
                &corpus,
                originals.as_deref(),
                min_frequency,
                min_gain,
                config,
                cli.quiet,
            )?;
        }
        Commands::Compress {
            input,
            output,
            domain,
            json,
        } => {
            compress_command(
                &cli.store,
                &input,
                &output,
                domain.as_deref(),
                json,
                config,
                cli.quiet,
            )?;
        }
        Commands::Expand { input, output } => {
            expand_command(&cli.store, &input, &output)?;
        }
        Commands::Top { count, domain } => {
            top_command(&cli.store, count, domain.as_deref())?;
        }
        Commands::Get { id } => {
            get_command(&cli.store, &id)?;
        }
        Commands::Stats => {
            stats_command(&cli.store)?;
        }
    }

    Ok(())
}

/// Set up logging based on verbosity flags; `RUST_LOG` takes precedence
fn setup_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Load configuration from a JSON file
fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    EngineConfig::from_json(&text).map_err(|e| map_tps_error(e, "Loading configuration"))
}

/// Read input from file or stdin
fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else {
        fs::read_to_string(input).with_context(|| format!("Failed to read input file: {}", input))
    }
}

/// Write output to file or stdout
fn write_output(output: &str, content: &str) -> Result<()> {
    if output == "-" {
        io::stdout()
            .write_all(content.as_bytes())
            .context("Failed to write to stdout")?;
        io::stdout().flush().context("Failed to flush stdout")?;
    } else {
        fs::write(output, content)
            .with_context(|| format!("Failed to write output file: {}", output))?;
    }
    Ok(())
}

/// Open the pattern store, creating an empty one if the file is missing
fn open_store(path: &Path) -> Result<PatternStore> {
    PatternStore::open(path).map_err(|e| map_tps_error(e, "Opening pattern store"))
}

/// Execute the train command
fn train_command(
    store_path: &Path,
    corpus: &str,
    originals: Option<&str>,
    min_frequency: Option<u64>,
    min_gain: Option<usize>,
    config: EngineConfig,
    quiet: bool,
) -> Result<()> {
    let corpus_text = read_input(corpus)?;
    let sequences: Vec<&str> = corpus_text.lines().collect();

    let originals_text = originals.map(read_input).transpose()?;
    let original_lines: Option<Vec<&str>> =
        originals_text.as_deref().map(|text| text.lines().collect());
    if let Some(lines) = &original_lines {
        if lines.len() != sequences.len() {
            warn!(
                "Originals have {} lines but corpus has {}; the rest use tokens as examples",
                lines.len(),
                sequences.len()
            );
        }
    }

    let mut trainer_config = config.trainer;
    if let Some(min_frequency) = min_frequency {
        trainer_config.miner.min_frequency = min_frequency;
    }
    if let Some(min_gain) = min_gain {
        trainer_config.min_gain = min_gain;
    }
    let trainer =
        Trainer::with_config(trainer_config).map_err(|e| map_tps_error(e, "Configuring trainer"))?;

    info!("Training on {} sequences", sequences.len());
    let mut store = open_store(store_path)?;
    let report = trainer
        .train_with_originals(&mut store, &sequences, original_lines.as_deref())
        .map_err(|e| map_tps_error(e, "Training"))?;

    if !quiet {
        print!("{}", report);
        println!("Store: {} ({} patterns)", store_path.display(), store.len());
    }

    Ok(())
}

/// Execute the compress command
fn compress_command(
    store_path: &Path,
    input: &str,
    output: &str,
    domain: Option<&str>,
    json: bool,
    config: EngineConfig,
    quiet: bool,
) -> Result<()> {
    let input_data = read_input(input)?;

    if input_data.is_empty() {
        if !quiet {
            eprintln!("Warning: Input is empty");
        }
        write_output(output, "")?;
        return Ok(());
    }

    let store = open_store(store_path)?;
    if store.is_empty() && !quiet {
        eprintln!("Warning: Pattern store {} is empty", store_path.display());
    }

    let compressor = SubstitutionCompressor::with_config(&store, config.compressor)
        .map_err(|e| map_tps_error(e, "Configuring compressor"))?;

    let lines: Vec<&str> = input_data.lines().collect();
    let progress = if quiet || lines.len() <= BATCH_SIZE {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(lines.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} lines")
                .context("Invalid progress template")?,
        );
        bar
    };

    let mut results: Vec<Compressed> = Vec::with_capacity(lines.len());
    for chunk in lines.chunks(BATCH_SIZE) {
        let hints = vec![domain; chunk.len()];
        results.extend(compressor.batch_compress(chunk, Some(hints.as_slice())));
        progress.inc(chunk.len() as u64);
    }
    progress.finish_and_clear();

    let mut content = String::with_capacity(input_data.len());
    for result in &results {
        if json {
            let record = serde_json::to_string(result).context("Failed to encode metadata")?;
            content.push_str(&record);
        } else {
            content.push_str(&result.text);
        }
        content.push('\n');
    }
    write_output(output, &content)?;

    let original: usize = results.iter().map(|r| r.metadata.original_tokens).sum();
    let saved: usize = results.iter().map(|r| r.metadata.tokens_saved).sum();
    let substitutions: usize = results.iter().map(|r| r.metadata.patterns_used.len()).sum();
    debug!("{} substitutions applied", substitutions);
    if !quiet {
        let ratio = if original > 0 {
            saved as f64 / original as f64 * 100.0
        } else {
            0.0
        };
        eprintln!(
            "Compressed {} lines: {} tokens to {} tokens (saved {}, {:.1}%)",
            results.len(),
            original,
            original - saved,
            saved,
            ratio
        );
    }

    Ok(())
}

/// Execute the expand command
fn expand_command(store_path: &Path, input: &str, output: &str) -> Result<()> {
    let input_data = read_input(input)?;
    let store = open_store(store_path)?;
    let compressor = SubstitutionCompressor::new(&store);

    let expanded = compressor
        .expand(&input_data)
        .map_err(|e| map_tps_error(e, "Expanding REF tokens"))?;
    write_output(output, &expanded)
}

/// Execute the top command
fn top_command(store_path: &Path, count: usize, domain: Option<&str>) -> Result<()> {
    let store = open_store(store_path)?;
    let patterns = store.top(count, domain);

    if patterns.is_empty() {
        println!("No patterns");
        return Ok(());
    }

    println!("{:<10} {:>8} {:>5} {:>8}  PATTERN", "ID", "FREQ", "GAIN", "VALUE");
    for p in patterns {
        println!(
            "{:<10} {:>8} {:>5} {:>8}  {}",
            p.id,
            p.frequency,
            p.compression_gain,
            p.value_score(),
            p.pattern
        );
    }
    Ok(())
}

/// Execute the get command
fn get_command(store_path: &Path, id: &str) -> Result<()> {
    let store = open_store(store_path)?;
    let pattern = store
        .get(id)
        .map_err(|e| map_tps_error(e, "Looking up pattern"))?;
    println!(
        "{}",
        serde_json::to_string_pretty(pattern).context("Failed to encode pattern")?
    );
    Ok(())
}

/// Execute the stats command
fn stats_command(store_path: &Path) -> Result<()> {
    let store = open_store(store_path)?;
    let stats = store.stats();

    println!("=== Pattern Store ===\n");
    println!("File: {}", store_path.display());
    println!("Patterns: {}", stats.total_patterns);
    println!("Total uses: {}", stats.total_uses);
    println!("Total tokens saved: {}", stats.total_tokens_saved);
    println!("Average gain: {:.2}", stats.avg_compression_gain);
    match stats.most_used {
        Some(most) => println!(
            "Most used: {} x{} {}",
            most.id, most.frequency, most.pattern
        ),
        None => println!("Most used: -"),
    }
    Ok(())
}

/// Map TpsError to anyhow::Error with context
fn map_tps_error(error: TpsError, context: &str) -> anyhow::Error {
    match error {
        TpsError::NotFound(id) => {
            anyhow::anyhow!("{}: no pattern with id {}", context, id)
        }
        TpsError::Format { path, source } => {
            anyhow::anyhow!(
                "{}: {} is not a valid pattern store ({})",
                context,
                path.display(),
                source
            )
        }
        TpsError::Serialize(e) => {
            anyhow::anyhow!("{}: could not serialize pattern store: {}", context, e)
        }
        TpsError::IoError(e) => {
            anyhow::anyhow!("{}: IO error: {}", context, e)
        }
        TpsError::InvalidConfig(message) => {
            anyhow::anyhow!("{}: invalid configuration: {}", context, message)
        }
        TpsError::MalformedReference(token) => {
            anyhow::anyhow!("{}: malformed REF token {}", context, token)
        }
        TpsError::StaleReference { id, expected, found } => {
            anyhow::anyhow!(
                "{}: REF token for {} is v{} but the store holds v{}",
                context,
                id,
                found,
                expected
            )
        }
    }
}
