#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the flood road-closure aggregator.

use std::path::PathBuf;

use carto_inondations_archive::file_repo::FileRepository;
use carto_inondations_merge::{emit, output, run_pipeline};
use carto_inondations_source::registry::{all_sources, enabled_sources};
use chrono::Utc;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "carto_inondations", about = "Agrégation des coupures de routes inondées")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one aggregation pass over all configured sources
    Run {
        /// Directory holding the archive, the run snapshot and the DIRO
        /// input file
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        /// Directory the map outputs are written to
        #[arg(long, default_value = "out")]
        output_dir: PathBuf,
        /// Comma-separated list of source tags to run (overrides the
        /// `CARTO_SOURCES` env var)
        #[arg(long)]
        sources: Option<String>,
    },
    /// List all configured data sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Run {
        data_dir: PathBuf::from("data"),
        output_dir: PathBuf::from("out"),
        sources: None,
    });

    match command {
        Commands::Sources => {
            let sources = all_sources(&PathBuf::from("data"));
            println!("{:<20} NOM", "TAG");
            println!("{}", "-".repeat(50));
            for source in &sources {
                println!("{:<20} {}", source.source(), source.name());
            }
        }
        Commands::Run {
            data_dir,
            output_dir,
            sources,
        } => {
            let adapters = enabled_sources(&data_dir, sources);
            let repo = FileRepository::new(&data_dir);
            let previous_health = output::load_previous_health(&output_dir);
            let now = Utc::now();

            let result = run_pipeline(&adapters, &repo, previous_health, now).await;
            emit(&output_dir, &result)?;
            log::info!(
                "terminé: {} publiés, {} filtrés, santé {}",
                result.metadata.total_published,
                result.metadata.total_filtered,
                result.metadata.health.global
            );
        }
    }

    Ok(())
}
