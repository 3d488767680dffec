use anyhow::Context;
use clap::{Parser, Subcommand};
use rvd::{read_rvd, set_validation, write_rvd, PartitionSetReader, RvdConfig, RvdContext};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Inspect and maintain persisted RVD partition sets
#[derive(Parser, Debug)]
#[command(name = "rvd")]
#[command(about = "Inspect and maintain range-partitioned row sets", long_about = None)]
struct Args {
    /// JSON file with execution settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of worker threads (overrides the config file)
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the schema, partition bounds and row counts of a set
    Inspect {
        /// Directory holding the set
        dir: PathBuf,
    },
    /// Check checksums, row order and partition bounds of a set
    Validate {
        /// Directory holding the set
        dir: PathBuf,
    },
    /// Merge adjacent partitions of a set and write the result
    Coalesce {
        /// Directory holding the set
        dir: PathBuf,
        /// Output directory
        out: PathBuf,
        /// Maximum number of output partitions
        #[arg(short = 'n', long)]
        partitions: usize,
        /// Merge equally many partitions per group, ignoring row counts
        #[arg(long)]
        naive: bool,
    },
}

fn load_config(args: &Args) -> anyhow::Result<RvdConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            RvdConfig::from_json(&json)?
        }
        None => RvdConfig::default(),
    };
    if args.parallelism.is_some() {
        config.parallelism = args.parallelism;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if std::env::var("RVD_VALIDATE").map_or(false, |v| v == "1") {
        set_validation(true);
    }

    let config = load_config(&args)?;
    let ctx = RvdContext::new(config)?;
    info!(
        "Starting RVD v{} ({} tasks)",
        env!("CARGO_PKG_VERSION"),
        if ctx.runner().is_parallel() { "parallel" } else { "sequential" }
    );

    match args.command {
        Command::Inspect { dir } => {
            let reader = PartitionSetReader::open(&dir)?;
            let manifest = reader.manifest();
            println!("set:        {}", manifest.id);
            println!("created:    {}", manifest.created_at);
            println!("schema:     {}", reader.schema());
            println!("key:        [{}]", manifest.key.join(", "));
            println!(
                "partitions: {} ({} rows)",
                reader.num_partitions(),
                manifest.total_rows()
            );
            for (i, (bound, entry)) in reader
                .partitioner()
                .range_bounds()
                .iter()
                .zip(&manifest.partitions)
                .enumerate()
            {
                println!("  {:>5}  {:>10}  {}", i, entry.rows, bound);
            }
        }
        Command::Validate { dir } => {
            set_validation(true);
            let reader = PartitionSetReader::open(&dir)?;
            reader.verify_checksums(&ctx)?;
            let rvd = reader.read_rvd(&ctx)?;
            rvd.validate(&ctx)?;
            info!("{:?} is valid: {} rows in {} partitions", dir, rvd.count(), rvd.num_partitions());
        }
        Command::Coalesce {
            dir,
            out,
            partitions,
            naive,
        } => {
            let rvd = read_rvd(&ctx, &dir)?;
            let coalesced = if naive {
                rvd.naive_coalesce(&ctx, partitions)?
            } else {
                let outcome = rvd.coalesce(&ctx, partitions)?;
                if let Some(shortfall) = outcome.shortfall {
                    warn!("{:?}: {}", dir, shortfall);
                }
                outcome.rvd
            };
            write_rvd(&ctx, &coalesced, &out)?;
            info!(
                "Coalesced {} partitions into {} at {:?}",
                rvd.num_partitions(),
                coalesced.num_partitions(),
                out
            );
        }
    }

    Ok(())
}
