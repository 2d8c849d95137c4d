use anyhow::Result;
use clap::{Parser, Subcommand};
use psc_ledger::VerifyResult;

mod client;
mod commands;

use commands::{demo, inspect, simulate};

#[derive(Parser)]
#[command(name = "psc")]
#[command(about = "PharmaTrace supply-chain CLI", long_about = None)]
struct Cli {
    /// Daemon base URL (overrides simulator.api_url and PSC_API_URL)
    #[arg(long, global = true)]
    api: Option<String>,

    /// Layered config paths in merge order (default: config/base.yaml if present)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env overrides ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Re-walk a ledger journal's hash chain offline
    VerifyJournal {
        /// Path to the JSONL journal
        path: String,
    },

    /// Walk one batch through the full chain against a running daemon
    Demo {
        /// Batch id (default: DEMO-<unix seconds>)
        #[arg(long)]
        batch_id: Option<String>,
    },

    /// Push simulated sensor readings to the daemon
    Simulate {
        #[command(subcommand)]
        cmd: SimulateCmd,
    },

    /// Read-only views of daemon state
    Inspect {
        #[command(subcommand)]
        cmd: InspectCmd,
    },
}

#[derive(Subcommand)]
enum SimulateCmd {
    /// Periodic readings along a route until ctrl-c (or --count readings)
    Start {
        batch_id: String,

        /// Comma-separated stops (default: simulator.route, else the built-in route)
        #[arg(long, value_delimiter = ',')]
        route: Vec<String>,

        /// Seconds between readings (default: simulator.interval_secs)
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Stop after this many readings
        #[arg(long)]
        count: Option<u64>,
    },

    /// One reading per stop of the supplier-to-pharmacy journey
    Journey {
        batch_id: String,

        /// Total duration spread evenly over all stops
        #[arg(long, default_value_t = 60)]
        duration_secs: u64,
    },

    /// A single reading
    Log {
        batch_id: String,

        /// Site name (default: a random stop on the configured route)
        #[arg(long)]
        location: Option<String>,
    },
}

#[derive(Subcommand)]
enum InspectCmd {
    /// All alerts, newest first
    Alerts,
    /// Batch record plus custody history
    Batch { batch_id: String },
    /// Registered users
    Users,
    /// Notifications for one address
    Notifications { address: String },
    /// Most recent transaction records, newest first
    Transactions {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = psc_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::VerifyJournal { path } => match psc_ledger::verify_journal(&path)? {
            VerifyResult::Valid { lines } => {
                println!("journal_valid=true lines={}", lines);
            }
            VerifyResult::Broken { line, reason } => {
                println!("journal_valid=false line={}", line);
                anyhow::bail!("JOURNAL_BROKEN line={} reason={}", line, reason);
            }
        },

        Commands::Demo { batch_id } => {
            let ctx = commands::CliContext::load(cli.api, &cli.config_paths)?;
            demo::run(&ctx, batch_id).await?;
        }

        Commands::Simulate { cmd } => {
            let ctx = commands::CliContext::load(cli.api, &cli.config_paths)?;
            match cmd {
                SimulateCmd::Start {
                    batch_id,
                    route,
                    interval_secs,
                    count,
                } => {
                    simulate::start(
                        &ctx,
                        simulate::StartArgs {
                            batch_id,
                            route,
                            interval_secs,
                            count,
                        },
                    )
                    .await?
                }
                SimulateCmd::Journey {
                    batch_id,
                    duration_secs,
                } => simulate::journey(&ctx, &batch_id, duration_secs).await?,
                SimulateCmd::Log { batch_id, location } => {
                    simulate::log_once(&ctx, &batch_id, location.as_deref()).await?
                }
            }
        }

        Commands::Inspect { cmd } => {
            let ctx = commands::CliContext::load(cli.api, &cli.config_paths)?;
            match cmd {
                InspectCmd::Alerts => inspect::alerts(&ctx).await?,
                InspectCmd::Batch { batch_id } => inspect::batch(&ctx, &batch_id).await?,
                InspectCmd::Users => inspect::users(&ctx).await?,
                InspectCmd::Notifications { address } => {
                    inspect::notifications(&ctx, &address).await?
                }
                InspectCmd::Transactions { limit } => inspect::transactions(&ctx, limit).await?,
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries key=value output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
