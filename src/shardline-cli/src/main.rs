//! `shardline` - inspect the partition catalog and run the demo pipeline.
//!
//! # Usage
//!
//! ```bash
//! shardline --config shardline.toml names
//! shardline --config shardline.toml files etl@1 0
//! shardline --config shardline.toml drop etl@1 --part 3
//! RUST_LOG=debug shardline demo --partitions 4
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use common_config::ShardlineConfig;
use common_error::ShardlineResult;
use shardline_pipeline::{PipelineContext, PipelineEngine};

use shardline_cli::{
    drop_partitions, list_files, list_names, list_partitions, print_header, run_demo,
};

#[derive(Parser, Debug)]
#[command(name = "shardline")]
#[command(about = "Partitioned batch pipelines with a durable partition catalog")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List names with registered partitions
    Names,

    /// List the partitions of a name
    Partitions {
        /// Generation name, e.g. etl@1
        name: String,
    },

    /// List the files of one partition
    Files {
        name: String,
        part: usize,
    },

    /// Remove partitions from the catalog
    Drop {
        name: String,

        /// Only this partition
        #[arg(short, long)]
        part: Option<usize>,
    },

    /// Run a constant-rows + shuffle pipeline
    Demo {
        #[arg(short, long, default_value = "demo")]
        name: String,

        /// Number of rows to inject
        #[arg(short, long, default_value_t = 3)]
        rows: i64,

        /// Shuffle partitions
        #[arg(short, long, default_value_t = 2)]
        partitions: usize,
    },
}

fn main() -> ShardlineResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            ShardlineConfig::load(path)?
        }
        None => ShardlineConfig::default(),
    };
    common_runtime::block_on_result(run(config, args.command))
}

async fn run(config: ShardlineConfig, command: Commands) -> ShardlineResult<()> {
    let engine = PipelineEngine::new(PipelineContext::from_config(config).await?);

    match command {
        Commands::Names => {
            for name in list_names(&engine).await? {
                println!("{name}");
            }
        }
        Commands::Partitions { name } => {
            for (part, files) in list_partitions(&engine, &name).await? {
                println!("{part}\t{files} files");
            }
        }
        Commands::Files { name, part } => {
            for file in list_files(&engine, &name, part).await? {
                println!("{file}");
            }
        }
        Commands::Drop { name, part } => {
            let removed = drop_partitions(&engine, &name, part).await?;
            println!("removed {removed} partitions");
        }
        Commands::Demo {
            name,
            rows,
            partitions,
        } => {
            print_header(&format!("{rows} rows shuffled into {partitions} partitions"));
            let (outcome, counts) = run_demo(&engine, &name, rows, partitions).await?;
            for report in &outcome.stages {
                println!(
                    "{:<10} {:<10} {:>3} run {:>3} skipped  {:?}",
                    report.generation.to_string(),
                    report.stage,
                    report.executed,
                    report.skipped,
                    report.elapsed
                );
            }
            for (part, count) in counts.iter().enumerate() {
                println!("{}[{part}]: {count} rows", outcome.generation);
            }
        }
    }
    Ok(())
}
