//! codehost command-line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use codehost::config::Config;
use codehost::index::CodeIndex;
use codehost::module::{hash_zip, ModuleProxy};

#[derive(Parser)]
#[command(name = "codehost")]
#[command(about = "Serves bare Git repositories over smart HTTP and as a Go module proxy", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Overrides server.bind_address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print every indexed directory
    Index,
    /// Print the go.sum line for a module version
    Ziphash {
        #[arg(long)]
        module: String,
        #[arg(long)]
        version: String,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn open_index(config: &Config) -> Result<CodeIndex> {
    CodeIndex::open(&config.repositories.dir, &config.repositories.domain)
        .with_context(|| format!("Failed to index {}", config.repositories.dir.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            codehost::server::serve(config).await?;
        }
        Commands::Index => {
            let index = open_index(&config)?;
            for dir in index.sorted() {
                match &dir.package {
                    Some(package) if package.synopsis.is_empty() => {
                        println!("{}\t{}", dir.import_path, package.name)
                    }
                    Some(package) => println!("{}\t{}\t{}", dir.import_path, package.name, package.synopsis),
                    None => println!("{}", dir.import_path),
                }
            }
        }
        Commands::Ziphash { module, version } => {
            let proxy = ModuleProxy::new(Arc::new(open_index(&config)?));
            let zip = proxy
                .zip(&module, &version)
                .with_context(|| format!("Failed to build {}@{}", module, version))?;
            println!("{} {} {}", module, version, hash_zip(&zip)?);
        }
    }

    Ok(())
}
