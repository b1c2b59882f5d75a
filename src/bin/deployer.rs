// ─────────────────────────────────────────────────────────────────────────────
//  Deployer
//
//  Listens for curve deployment requests on Redis and answers each one with
//  the outcome once the factory transaction is confirmed or has failed.
// ─────────────────────────────────────────────────────────────────────────────

use std::path::PathBuf;

use clap::Parser;
use curvekeeper::engine::DeployerEngine;
use curvekeeper::error::Result;

#[derive(Parser, Debug)]
#[command(name = "deployer", about = "Bonding curve deployment service")]
struct Args {
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    DeployerEngine::run(&args.config).await?;
    Ok(())
}
