use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

/// Content-addressable file store CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The root directory of the store
    #[arg(long, global = true, env = "CAFS_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Path to a configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Add files to the store
    Add(commands::add::Opt),

    /// Check a file against an integrity string
    Verify(commands::verify::Opt),

    /// Print where content with a given integrity is stored
    Path(commands::path::Opt),
}

/// Entry point of the `cafs` cli.
#[tokio::main]
async fn main() -> miette::Result<()> {
    // Parse the command line arguments
    let cli = Cli::parse();

    // Setup logging, `RUST_LOG` takes precedence over the verbosity flags
    let env_filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env()
        .map_err(|e| miette::miette!("invalid RUST_LOG: {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish()
        .try_init()
        .map_err(|e| miette::miette!("failed to initialize logging: {e}"))?;

    let config = config::Config::load(cli.config.as_deref())?;
    let store_dir = || -> miette::Result<PathBuf> {
        let store_dir = config::resolve_store_dir(cli.store_dir.clone(), &config)?;
        tracing::debug!("using store at '{}'", store_dir.display());
        Ok(store_dir)
    };

    // Dispatch the selected command, only commands that touch the store need
    // to know where it is.
    match cli.command {
        Commands::Add(opt) => commands::add::add(opt, store_dir()?, &config).await,
        Commands::Verify(opt) => commands::verify::verify(opt).await,
        Commands::Path(opt) => commands::path::path(opt, store_dir()?),
    }
}
