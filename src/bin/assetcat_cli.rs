//! AssetCat CLI - Build concatenated assets from the command line
//!
//! Commands: build, engines, stale
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on build failure

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use assetcat_core::{
    AssetConfig, AssetError, AssetPipeline, ConcatenatedAsset, FileEnvironment, ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "assetcat-cli")]
#[command(about = "AssetCat CLI - Dependency-Resolving Asset Concatenator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: ./assetcat.config.json if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra load path for <name> requires (repeatable)
    #[arg(short = 'I', long = "load-path")]
    load_paths: Vec<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an asset and print its manifest
    Build {
        /// Root source file
        file: PathBuf,

        /// Write the concatenated content here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered engine extensions
    Engines,

    /// Report whether any source of an asset changed after a timestamp
    Stale {
        /// Root source file
        file: PathBuf,

        /// Build timestamp (RFC 3339)
        #[arg(short, long)]
        mtime: DateTime<Utc>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => match AssetConfig::from_path(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
                return ExitCode::FAILURE;
            }
        },
        None => AssetConfig::discover(&std::env::current_dir().unwrap_or_default()),
    };
    config.load_paths.extend(cli.load_paths);

    let pipeline = AssetPipeline::new(config.environment(), config.engines());

    match cli.command {
        Commands::Engines => {
            let output = serde_json::json!({
                "engine_version": ENGINE_VERSION,
                "engines": pipeline.engines().extensions(),
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            ExitCode::SUCCESS
        }

        Commands::Build { file, output } => {
            let asset = match build(&pipeline, &file) {
                Ok(a) => a,
                Err(e) => {
                    let output = serde_json::json!({ "success": false, "error": e.to_string() });
                    println!("{output}");
                    return ExitCode::from(2);
                }
            };

            if let Some(path) = output {
                let written = File::create(&path).and_then(|f| asset.write_to(BufWriter::new(f)));
                if let Err(e) = written {
                    let output = serde_json::json!({
                        "success": false,
                        "error": format!("Failed to write {}: {}", path.display(), e),
                    });
                    println!("{output}");
                    return ExitCode::FAILURE;
                }
            }

            let output = serde_json::json!({
                "success": true,
                "asset": asset.manifest(),
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            ExitCode::SUCCESS
        }

        Commands::Stale { file, mtime } => match build(&pipeline, &file) {
            Ok(asset) => {
                let stale = asset.modified_since(pipeline.environment(), mtime);
                println!("{}", serde_json::json!({ "stale": stale, "mtime": asset.mtime() }));
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}", serde_json::json!({ "stale": true, "error": e.to_string() }));
                ExitCode::from(2)
            }
        },
    }
}

fn build(
    pipeline: &AssetPipeline<FileEnvironment>,
    file: &Path,
) -> Result<ConcatenatedAsset, AssetError> {
    pipeline.build_path(file)
}
