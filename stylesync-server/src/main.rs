use std::sync::Arc;

use clap::{Parser, Subcommand};
use stylesync_core::{Credentials, StyleSyncConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use stylesync_server::http::{self, HttpState};
use stylesync_server::subsystems::{components, seed};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "stylesync.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the dashboard and catalog API (default)
    Serve,
    /// Load the built-in trend dataset into the memory index
    Seed {
        /// Run a recall query afterwards and print the keywords
        #[arg(long)]
        verify: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match StyleSyncConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging (RUST_LOG wins over the configured level)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let credentials = Credentials::from_env();
    tracing::debug!(?credentials, "Loaded credentials");

    let components = components::build_components(&config, &credentials).await?;

    if let Some(Command::Seed { verify }) = args.command {
        if !components.memory.is_available() {
            println!("❌ Trend memory is unavailable. Check the backend and its credentials.");
            std::process::exit(1);
        }

        let written = seed::seed_trends(&components.memory).await?;
        println!("✅ Seeded {} of {} trend records", written, seed::TREND_DATASET.len());

        if verify {
            println!("🔎 Testing recall for: '{}'", seed::VERIFY_QUERY);
            let keywords = seed::verify_recall(&components.memory).await;
            if keywords.is_empty() {
                println!("⚠️  No results found. The index may still be indexing.");
            } else {
                println!("✅ Memory retrieved: {}", keywords.join(", "));
            }
        }
        return Ok(());
    }

    if config.memory.seed_on_startup && components.memory.is_available() {
        if let Err(e) = seed::seed_trends(&components.memory).await {
            tracing::warn!(error = %e, "Startup seeding failed, continuing with existing memory");
        }
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(HttpState {
        pipeline: components.pipeline,
        uploads: components.uploads,
        dashboard_path: config.http.dashboard_path().into(),
    });

    http::start_http_server(state, &config.http, tx.subscribe()).await
}
