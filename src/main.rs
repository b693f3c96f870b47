//! Binary entry point: load config, install the logger, start the
//! receiver, and run until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use audit_log_core::{Config, Receiver, ScriptedConsumer};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match config_path {
        Some(path) => load_config(&path)?,
        None => {
            log::warn!("no config file given, using defaults (in-memory storage)");
            Config::default()
        }
    };

    // No downstream consumer is wired in yet, so the binary runs with the
    // always-succeeding stand-in to stay runnable standalone.
    let consumer = Arc::new(ScriptedConsumer::always_succeeds());

    let receiver = Receiver::start(config, consumer).await?;
    log::info!("audit-log-receiver started, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    log::info!("shutdown signal received");

    receiver.shutdown(Duration::from_secs(10)).await?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<Config, BoxError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}
