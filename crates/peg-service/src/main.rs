use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use peg_core::EngineConfig;
use peg_service::{build_router, ServiceConfig, ServiceState};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "pegd", version, about = "Peg accounting engine REST service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8092
    #[arg(long, default_value = "127.0.0.1:8092", env = "PEG_LISTEN")]
    listen: SocketAddr,
    /// Account that holds deposited collateral and the mint authority.
    #[arg(long, default_value = "peg-engine", env = "PEG_CUSTODY_ACCOUNT")]
    custody_account: String,
    /// Symbol of the unit-of-account token.
    #[arg(long, default_value = "pUSD", env = "PEG_UNIT_SYMBOL")]
    unit_symbol: String,
    /// JSON file with risk parameters; omitted fields keep their defaults.
    #[arg(long, env = "PEG_ENGINE_CONFIG")]
    engine_config: Option<PathBuf>,
}

fn load_engine_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading engine config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing engine config {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "peg_service=info,peg_core=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig {
        engine: load_engine_config(cli.engine_config.as_ref())?,
        custody_account: cli.custody_account,
        unit_symbol: cli.unit_symbol,
        ..ServiceConfig::default()
    };
    let state = ServiceState::bootstrap(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("peg-service REST listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
