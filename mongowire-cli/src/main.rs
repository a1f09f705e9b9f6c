//! mongowire-cli - Command-line interface for probing MongoDB deployments
//!
//! Runs one command per invocation over the legacy wire protocol.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use mongowire_client::{Client, ClientConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mongowire-cli")]
#[command(about = "Command-line interface for the legacy MongoDB wire protocol")]
#[command(version)]
struct Cli {
    /// Seed address (host or host:port)
    #[arg(short, long, env = "MONGOWIRE_SEED")]
    seed: Option<String>,

    /// Connect to the seed only, without replica-set discovery
    #[arg(long)]
    direct: bool,

    /// Request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and list replica-set members
    Topology,

    /// Run isMaster against the default member
    IsMaster,

    /// Run a database command
    Command {
        /// Database name
        database: String,

        /// Command document as JSON (or @file.json to read from file)
        command: String,
    },

    /// Query a collection
    Find {
        /// Namespace (database.collection)
        namespace: String,

        /// Filter document as JSON
        filter: Option<String>,

        /// Maximum documents to return (negative for a single batch)
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        limit: i32,

        /// Documents per batch
        #[arg(short, long, default_value = "0")]
        batch_size: i32,

        /// Documents to skip
        #[arg(long, default_value = "0")]
        skip: i32,

        /// Sort document as JSON
        #[arg(long)]
        sort: Option<String>,

        /// Allow reads from secondaries
        #[arg(long)]
        slave_ok: bool,
    },

    /// Insert documents into a collection
    Insert {
        /// Namespace (database.collection)
        namespace: String,

        /// Documents as JSON (each may be @file.json)
        #[arg(required = true)]
        documents: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load().map_err(|e| {
        eprintln!("{}: {}", "Configuration error".red(), e);
        e
    })?;
    if let Some(seed) = cli.seed {
        config.network.seed = seed;
    }
    if let Some(ms) = cli.timeout_ms {
        config.network.request_timeout_ms = ms;
    }

    let connected = if cli.direct {
        let seed = config.network.seed.clone();
        Client::connect_direct(&seed, config).await
    } else {
        Client::connect_with_config(config).await
    };
    let client = connected.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    let result = commands::execute(&client, cli.command).await;
    client.close().await;

    match result {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
