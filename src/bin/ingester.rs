// ─────────────────────────────────────────────────────────────────────────────
//  Ingester
//
//  Keeps curve state, trades, transfers and reward payouts in step with the
//  chain. Runs until Ctrl-C, then finishes the batch in progress and exits.
// ─────────────────────────────────────────────────────────────────────────────

use std::path::PathBuf;

use clap::Parser;
use curvekeeper::engine::IngesterEngine;
use curvekeeper::error::Result;

#[derive(Parser, Debug)]
#[command(name = "ingester", about = "Chain event ingester for bonding curves")]
struct Args {
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    IngesterEngine::run(&args.config).await?;
    Ok(())
}
