//! CLI entry point for the recommend pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use recommend_core::{
    app_data_dir, default_dataset_path, load_config, save_config, status, write_json, Config,
    OllamaEncoder, Pipeline, Segmenter,
};

#[derive(Parser)]
#[command(name = "recommend")]
#[command(about = "recommend: crawl the brand catalog and build embedding datasets")]
struct Cli {
    /// Config file (default: config.toml in the app data directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status (for dev).
    Status,
    /// Show where recommend stores its config and datasets (app data directory).
    DataDir,
    /// Write the default config into the app data directory.
    InitConfig,
    /// Discover the catalog and list its records.
    Catalog {
        /// Print records as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Split a text into sentences the way the embedder sees it.
    Segment {
        #[arg(value_name = "TEXT")]
        text: String,
    },
    /// Crawl, embed and merge; writes the dataset as JSON.
    Run {
        /// Output file (default: brand_dataset.json in the app data directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Only process the first N catalog records.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            println!("recommend backend");
            println!("  core: {}", status());
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
        Commands::InitConfig => {
            let path = save_config(&Config::default())?;
            println!("Wrote {}", path.display());
        }
        Commands::Catalog { json } => {
            let config = load(cli.config.as_deref())?;
            let pipeline = pipeline(config)?;
            let records = pipeline.catalog().await?;
            for r in &records {
                if json {
                    println!("{}", serde_json::to_string(r)?);
                } else {
                    println!("{}  {:<12}  {:<24}  {}", r.id, r.category, r.name, r.source_url);
                }
            }
            eprintln!("{} record(s)", records.len());
        }
        Commands::Segment { text } => {
            let config = load(cli.config.as_deref())?;
            let segmenter = Segmenter::new(&config.terminals);
            for sentence in &segmenter.segment(&text) {
                println!("{}", sentence);
            }
        }
        Commands::Run { output, limit } => {
            let mut config = load(cli.config.as_deref())?;
            if limit.is_some() {
                config.limit = limit;
            }
            let output = match output {
                Some(p) => p,
                None => default_dataset_path().context("could not determine app data directory")?,
            };
            let outcome = pipeline(config)?.run().await?;
            write_json(&output, &outcome.dataset)?;
            println!("{}", outcome.report);
            println!("Wrote {} rows to {}", outcome.dataset.len(), output.display());
        }
    }
    Ok(())
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    load_config(path).context("loading config")
}

/// The encoder is built once here and shared by every embedding call of the run.
fn pipeline(config: Config) -> anyhow::Result<Pipeline<OllamaEncoder>> {
    let encoder = OllamaEncoder::from_url(&config.encoder.base_url)
        .with_context(|| format!("encoder at {}", config.encoder.base_url))?
        .with_embed_model(config.encoder.model.clone())
        .with_max_length(config.encoder.max_length);
    Ok(Pipeline::new(config, Arc::new(encoder))?)
}
