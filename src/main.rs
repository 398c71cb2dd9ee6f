use applyedit::{app, config};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// applyedit - apply LSP workspace edits to files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a saved workspace/applyEdit request against files
    Apply {
        /// JSON file holding the request params or the whole request
        #[arg(long)]
        params: PathBuf,

        /// Write changed files back instead of printing them
        #[arg(long)]
        write: bool,

        /// languageId of the opened documents
        #[arg(long, default_value = "plaintext")]
        language_id: String,

        /// Files to open
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Start the configured language server and apply the edits it sends
    Run {
        /// Config directory (contains applyedit.toml)
        #[arg(long, short = 'c', default_value = ".")]
        config_dir: PathBuf,

        /// Files to open
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Apply {
            params,
            write,
            language_id,
            files,
        } => {
            init_logging(None)?;
            apply_command(params, write, language_id, files)
        }
        Commands::Run { config_dir, files } => {
            let config = config::Config::load(&config_dir).with_context(|| {
                format!("Failed to load configuration from {}", config_dir.display())
            })?;
            init_logging(config.log_level.as_deref())?;
            run_command(config, files)
        }
    }
}

/// RUST_LOG wins over the configured level; default to "warn"
fn init_logging(log_level: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("warn")));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn apply_command(
    params_path: PathBuf,
    write: bool,
    language_id: String,
    files: Vec<PathBuf>,
) -> Result<()> {
    let raw = std::fs::read_to_string(&params_path)
        .with_context(|| format!("Failed to read {}", params_path.display()))?;
    let params: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not JSON", params_path.display()))?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (report, documents) = app::replay(params, &files, &language_id).await?;

        for (uri, applied) in &report.applied {
            eprintln!("applied {} edit(s) to {} (version {})", applied.edit_count, uri, applied.version);
        }
        for uri in &report.skipped {
            eprintln!("skipped {}: not open", uri);
        }
        for (uri, error) in &report.failed {
            eprintln!("failed {}: {}", uri, error);
        }

        for (uri, _) in &report.applied {
            let Some(document) = documents.iter().find(|d| d.uri() == uri.as_str()) else {
                continue;
            };
            if write {
                document
                    .save()
                    .await
                    .with_context(|| format!("Failed to write {}", uri))?;
                info!("Wrote {}", uri);
            } else {
                print!("{}", document.text()?);
            }
        }

        if !report.is_applied() {
            anyhow::bail!("{} document(s) failed", report.failed.len());
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn run_command(config: config::Config, files: Vec<PathBuf>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        let outcome = app::serve(&config, &files, shutdown)
            .await
            .context("Language server session failed")?;

        for path in &outcome.saved {
            println!("{}", path.display());
        }
        info!("Session ended with {} document(s)", outcome.documents.len());
        Ok::<(), anyhow::Error>(())
    })
}
