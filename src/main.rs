use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stockroom::ledger::ResourceKind;

mod cmd;

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(version, about = "Tool and material circulation ledger for the factory floor")]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to stockroom.toml (defaults to ./stockroom.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger database path. Overrides the config file and STOCKROOM_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or migrate the ledger database
    Init,
    /// Serve the HTTP API until Ctrl-C
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Permissive CORS for local front-end development
        #[arg(long)]
        dev: bool,
    },
    /// Manage resource pools
    Pool {
        #[command(subcommand)]
        command: PoolCommands,
    },
    /// Manage workers
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// Hand a quantity of a resource to a worker
    Assign(MovementArgs),
    /// Return a quantity of a resource from a worker
    Back(MovementArgs),
    /// Inspect and annotate ledger entries
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
    /// Cross-check a pool against its ledger entries and mirrors
    Reconcile {
        kind: ResourceKind,
        resource: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args, Clone)]
pub struct MovementArgs {
    /// Resource kind: custody or material
    pub kind: ResourceKind,
    /// Resource pool id
    pub resource: String,
    /// Worker id
    pub worker: String,
    pub quantity: i64,
    /// Free-text operation label (defaults to Take/Back)
    #[arg(long)]
    pub label: Option<String>,
    /// Replace the entry's note
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Subcommand, Clone)]
pub enum PoolCommands {
    /// Create a pool; prints it as JSON
    Add {
        kind: ResourceKind,
        #[arg(long)]
        name: String,
        #[arg(long)]
        total: i64,
        #[arg(long, default_value = "0")]
        min: i64,
        #[arg(long, default_value = "0")]
        max: i64,
        /// Minimum worker eligibility level
        #[arg(long, default_value = "0")]
        level: i32,
    },
    List {
        kind: ResourceKind,
    },
    Show {
        kind: ResourceKind,
        id: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum WorkerCommands {
    /// Register a worker; prints it as JSON
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "0")]
        level: i32,
    },
    Show {
        id: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum LedgerCommands {
    /// Entry for a resource/worker pair
    Pair {
        kind: ResourceKind,
        resource: String,
        worker: String,
    },
    /// Entry by ledger id
    Show { kind: ResourceKind, id: String },
    /// All entries for a worker
    Worker { kind: ResourceKind, id: String },
    /// All entries for a resource pool
    Resource { kind: ResourceKind, id: String },
    /// Replace an entry's note
    Note {
        kind: ResourceKind,
        id: String,
        text: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate configuration
    Validate,
    /// Write a default stockroom.toml
    Init {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = cmd::resolve_config(&cli)?;
    stockroom::telemetry::init_tracing(&config.logging.level, config.logging.format, cli.verbose);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Serve { port, host, dev } => {
            cmd::cmd_serve(config, *port, host.clone(), *dev).await?
        }
        Commands::Pool { command } => cmd::cmd_pool(&config, command.clone()).await?,
        Commands::Worker { command } => cmd::cmd_worker(&config, command.clone()).await?,
        Commands::Assign(args) => cmd::cmd_assign(&config, args.clone()).await?,
        Commands::Back(args) => cmd::cmd_back(&config, args.clone()).await?,
        Commands::Ledger { command } => cmd::cmd_ledger(&config, command.clone()).await?,
        Commands::Reconcile { kind, resource } => {
            cmd::cmd_reconcile(&config, *kind, resource).await?
        }
        Commands::Config { command } => cmd::cmd_config(&cli, &config, command.clone())?,
    }

    Ok(())
}
