use anyhow::{Context, Result};
use clap::Parser;
use sgp_ev::config::{CorrelationArgs, PolicyArgs};
use sgp_ev::data::load_pool;
use sgp_ev::server::{router, AppState};
use std::path::PathBuf;

/// SGP pricing web server
#[derive(Parser, Debug)]
#[command(name = "sgp-web", version, about)]
struct Args {
    /// Listen address
    #[arg(long, env = "SGP_BIND_ADDR", default_value = "127.0.0.1:3000")]
    bind_addr: String,

    /// Leg pool JSON shown on the overview page
    #[arg(long, env = "SGP_POOL_FILE")]
    pool_file: Option<PathBuf>,

    #[command(flatten)]
    policy: PolicyArgs,

    #[command(flatten)]
    correlations: CorrelationArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = Args::parse();

    let pool = match &args.pool_file {
        Some(path) => match load_pool(path) {
            Ok(pool) => {
                println!("Loaded {} legs from {}", pool.len(), path.display());
                Some(pool)
            }
            Err(e) => {
                eprintln!("Error loading pool: {:#}", e);
                eprintln!("Server will start but the overview page will be empty");
                None
            }
        },
        None => None,
    };

    let table = args.correlations.table()?;
    let policy = args.policy.into_policy()?;
    let state = tokio::task::spawn_blocking(move || AppState::new(table, policy, pool))
        .await
        .context("Overview build task failed")?
        .context("Failed to price the startup pool")?;

    println!("\nStarting web server at http://{}", args.bind_addr);
    println!("Press Ctrl+C to stop\n");

    let app = router(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&args.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind_addr))?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
