// ─────────────────────────────────────────────────────────────────────────────
//  Database Migration Tool
//
//  Applies all database migrations before services are started.
// ─────────────────────────────────────────────────────────────────────────────

use std::path::PathBuf;

use clap::Parser;
use curvekeeper::config::load_config;
use curvekeeper::error::Result;
use curvekeeper::storage::run_database_migrations;
use curvekeeper::tracing::setup_tracing;
use tracing::error;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "migrate", about = "Apply curvekeeper database migrations")]
struct Args {
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = load_config(&args.config)?;

    if let Err(e) = setup_tracing("migrate", &config.logging) {
        eprintln!("failed_to_setup_tracing: {}", e);
    }

    if let Err(e) = run_database_migrations("migrate", &config).await {
        error!("migrations_failed::error::{}", e);
        return Err(e);
    }
    info!("migrations_completed");
    Ok(())
}
