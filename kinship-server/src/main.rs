use clap::{Parser, Subcommand};
use kinship_core::ops::KinshipRequest;
use kinship_core::KinshipConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use kinship_server::subsystems::sync;
use kinship_server::{router, Kinship};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "kinship.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drain the mirror outbox until Ctrl-C (default)
    Relay,
    /// Check PostgreSQL, pgvector and the graph store
    Health,
    /// Apply the bundled schema
    InitSchema,
    /// Replay every user and connection into the graph store
    BackfillMirror,
    /// Run one JSON-encoded operation and print the response
    Call {
        /// e.g. '{"action":"network_stats","actor":"<uuid>"}'
        request: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match KinshipConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let kinship = match Kinship::connect(config).await {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    match args.command.unwrap_or(Command::Relay) {
        Command::Health => run_health(&kinship).await,
        Command::InitSchema => {
            kinship_core::db::ensure_schema(&kinship.pool).await?;
            println!("✅ Schema applied");
            Ok(())
        }
        Command::BackfillMirror => {
            if !kinship.mirror.is_available().await {
                eprintln!("Graph store '{}' is not available", kinship.mirror.name());
                std::process::exit(1);
            }
            let report = sync::backfill_mirror(&kinship.pool, kinship.mirror.as_ref()).await?;
            println!(
                "✅ Backfilled {} users and {} connections ({} failed)",
                report.users, report.connections, report.failed
            );
            Ok(())
        }
        Command::Call { request } => {
            let request: KinshipRequest = serde_json::from_str(&request)?;
            let response = router::handle_request(&kinship, request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.is_ok() {
                std::process::exit(2);
            }
            Ok(())
        }
        Command::Relay => run_relay(kinship).await,
    }
}

async fn run_health(kinship: &Kinship) -> anyhow::Result<()> {
    match kinship_core::db::health_check(&kinship.pool).await {
        Ok(v) => println!("✅ PostgreSQL connected: {}", v),
        Err(e) => {
            println!("❌ PostgreSQL connection failed: {}", e);
            std::process::exit(1);
        }
    }

    match kinship_core::db::check_pgvector(&kinship.pool).await {
        Ok(v) => println!("✅ pgvector version: {}", v),
        Err(e) => {
            println!("❌ pgvector check failed: {}", e);
            std::process::exit(1);
        }
    }

    // The graph store is optional: report it, never fail on it
    if kinship.mirror.is_available().await {
        println!("✅ Graph store reachable: {}", kinship.mirror.name());
    } else {
        println!("⚠️  Graph store unavailable ({}), reads fall back to the ledger", kinship.mirror.name());
    }

    println!("✅ Kinship health check passed");
    Ok(())
}

async fn run_relay(kinship: Kinship) -> anyhow::Result<()> {
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let relay = tokio::spawn(sync::run_relay_loop(
        kinship.pool.clone(),
        kinship.mirror.clone(),
        kinship.config.sync.clone(),
        tx.subscribe(),
    ));
    relay.await?;

    tracing::info!("Kinship server stopped");
    Ok(())
}
