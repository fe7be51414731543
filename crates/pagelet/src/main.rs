//! Pagelet CLI - author, preview and compile sandboxed mobile pages.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "pagelet")]
#[command(about = "Author, preview and compile sandboxed mobile pages")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to pagelet.toml config file
    #[arg(short, long, default_value = "pagelet.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create pagelet.toml and a starter page
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Start the live preview server
    Dev {
        /// Port to listen on (defaults to config or 7878)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Compile every page and store the records
    Build,

    /// Run a page through the preview pipeline and print the rendered tree
    Check {
        /// Page file
        file: PathBuf,
    },

    /// Print the compiled artifact for a page
    Transpile {
        /// Page file
        file: PathBuf,
    },

    /// Pull component source out of an AI response
    Extract {
        /// Response file (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Fail when the response has no fenced code block
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(&cli.config, yes).await?;
        }
        Commands::Dev { port, no_open } => {
            let config = config::load_config(&cli.config)?;
            commands::dev::run(config, port, !no_open).await?;
        }
        Commands::Build => {
            let config = config::load_config(&cli.config)?;
            commands::build::run(config).await?;
        }
        Commands::Check { file } => {
            let config = config::load_config(&cli.config)?;
            commands::check::run(config, &file)?;
        }
        Commands::Transpile { file } => {
            commands::transpile::run(&file)?;
        }
        Commands::Extract { file, strict } => {
            commands::extract::run(file.as_deref(), strict)?;
        }
    }

    Ok(())
}
