use anyhow::{Context, Result};
use hybrid_dispatch::{config::Config, simulation::Simulator, telemetry};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("failed to read .env");
        }
    }
    telemetry::init_tracing();

    let path = std::env::var("HPP_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let cfg = Config::load(&path)?;
    let simulator = Simulator::from_config(&cfg).context("invalid configuration")?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        telemetry::shutdown_signal().await;
        signal_token.cancel();
    });

    info!(config = %path, steps = cfg.simulation.steps, strategy = %cfg.dispatch.strategy, "starting hybrid dispatch run");

    let result = match simulator.run(&cancel).await {
        Ok(result) => result,
        Err(aborted) => {
            let report = serde_json::to_string_pretty(&aborted.partial.kpis)?;
            println!("{report}");
            return Err(aborted).context("simulation aborted");
        }
    };

    if !result.is_complete() {
        warn!(termination = %result.termination, steps = result.records.len(), "run ended early");
    }

    println!("{}", serde_json::to_string_pretty(&result.kpis)?);
    Ok(())
}
