//! SNSE Service - Query server and background collector.
//!
//! Run with: `cargo run -p snse-service`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use snse_service::router::{execute, route};
use snse_service::{AppState, Collector, Config, Query, QueryServer, answer_query};
use snse_store::LogStore;

/// SNSE Service - Query server and background collector.
#[derive(Parser, Debug)]
#[command(name = "snse-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Log directory (overrides config).
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Disable background collector (query only mode).
    #[arg(long, global = true)]
    no_collector: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Answer one query against the local logs and print the response.
    Query {
        /// Query string, e.g. `dev=192.168.1.6&time=months&data=06/2025`.
        query: String,

        /// Print the result as JSON instead of the wire response.
        #[arg(long)]
        json: bool,
    },

    /// Append a timestamped sample to a device log.
    Append {
        /// Device id (log file name without `.txt`).
        device: String,

        /// Sensor fields, e.g. `10:graph_P`.
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// List devices that have a log.
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("snse_service=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Query { ref query, json }) => run_query(&config, query, json),
        Some(Command::Append {
            ref device,
            ref fields,
        }) => {
            let store = LogStore::new(&config.storage.root);
            let sample = store.record(device, fields)?;
            println!("{}", sample);
            Ok(())
        }
        Some(Command::Devices) => {
            for device in LogStore::new(&config.storage.root).list_devices()? {
                println!("{}", device);
            }
            Ok(())
        }
        Some(Command::Run) | None => run_server(config, args.no_collector).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(snse_service::config::default_config_path()),
    };

    // Override config with CLI args
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(root) = &args.root {
        config.storage.root = root.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run_query(config: &Config, text: &str, json: bool) -> anyhow::Result<()> {
    let store = LogStore::new(&config.storage.root);
    let text = text.strip_prefix('?').unwrap_or(text);

    if json {
        let request = route(&Query::parse(text))?;
        let outcome = execute(&store, &request)
            .with_context(|| format!("query failed for device {}", request.device()))?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        let response = answer_query(&store, text, config.server.frame_missing_dev);
        print!("{}", response.encode());
    }
    Ok(())
}

async fn run_server(config: Config, no_collector: bool) -> anyhow::Result<()> {
    info!("Using log directory {}", config.storage.root.display());
    let store = LogStore::new(&config.storage.root);

    // Create application state
    let state = AppState::new(store, config);
    let cancel = CancellationToken::new();

    // Start the background collector
    let collectors = if no_collector {
        info!("Background collector disabled");
        Vec::new()
    } else {
        Collector::new(Arc::clone(&state)).start(cancel.clone())
    };

    let server = QueryServer::bind(Arc::clone(&state)).await?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
        shutdown.cancel();
    });

    server.run(cancel).await?;

    for handle in collectors {
        let _ = handle.await;
    }
    state.log_summary().await;
    Ok(())
}
