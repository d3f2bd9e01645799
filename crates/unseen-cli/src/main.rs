use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use unseen_cli::cli::{run_replay, run_watch, CliConfig, OutputFormat};
use unseen_core::{EngineConfig, NotificationEngine};

#[derive(Parser)]
#[command(name = "unseen")]
#[command(about = "Unread-message notifications for support inboxes")]
struct Cli {
    /// Path to JSON config file (engine settings, socketPath, api)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Staff id of the local user (overrides the config file)
    #[arg(long, global = true)]
    staff_id: Option<String>,

    /// Print one JSON object per view instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a recorded session (JSON lines) through the engine
    Replay {
        /// File with one event or control line per line
        file: PathBuf,
    },

    /// Follow the live relay socket and print views as they change
    Watch,
}

fn main() {
    if let Err(e) = unseen_core::tracing_setup::init_tracing() {
        eprintln!("Warning: {:#}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Commands::Replay { file } => replay_file(&file, config.engine, format),
        Commands::Watch => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(run_watch(config, format))
        }
    }
}

fn replay_file(path: &Path, config: EngineConfig, format: OutputFormat) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut engine = NotificationEngine::new(config);

    let stdout = std::io::stdout();
    let summary = run_replay(&mut engine, BufReader::new(file), &mut stdout.lock(), format)?;
    tracing::info!(lines = summary.lines, skipped = summary.skipped, "replay finished");
    Ok(())
}

/// Priority: --config, then the default config file if it exists, then
/// --staff-id alone. --staff-id always wins over the file.
fn load_config(cli: &Cli) -> Result<CliConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| CliConfig::default_path().filter(|p| p.exists()));

    let mut config = match (path, &cli.staff_id) {
        (Some(path), _) => CliConfig::load(&path)?,
        (None, Some(staff_id)) => CliConfig::new(EngineConfig::new(staff_id.clone())),
        (None, None) => anyhow::bail!("No config file found; pass --config or --staff-id"),
    };

    if let Some(staff_id) = &cli.staff_id {
        config.engine.staff_id = staff_id.clone();
    }
    config.validate()?;
    Ok(config)
}
