//! Oath engine binary.
//!
//! Startup sequence:
//! 1. Load configuration from `oath-config.yaml` (defaults if absent)
//! 2. Initialize tracing
//! 3. Build the session with every standard system registered
//! 4. Restore the save file, if one exists
//! 5. Run the tick loop until the tick limit or Ctrl-C
//! 6. Save, then shut every system down

mod error;
mod runner;
mod session;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use oath_core::config::{LoggingConfig, OathConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::session::Session;

const CONFIG_PATH: &str = "oath-config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration
    let (config, from_file) = load_config().context("loading configuration")?;

    // 2. Tracing
    init_tracing(&config.logging);
    info!("Oath Engine starting");
    if from_file {
        info!(path = CONFIG_PATH, "Configuration loaded");
    } else {
        warn!(path = CONFIG_PATH, "Config file not found, using defaults");
    }

    // 3. Session
    let mut session = Session::new(&config).context("building session")?;

    // 4. Restore
    session.restore().context("restoring save file")?;

    // 5. Tick loop
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_signal.store(true, Ordering::Release);
        }
    });
    let result = runner::run_session(&mut session, &config.engine, &stop).await;
    runner::log_session_end(&result);

    // 6. Save and shut down
    session.save().context("saving session")?;
    session.shutdown();
    info!(
        path = %session.save_path().display(),
        total_ticks = session.ticks(),
        systems = session.orchestrator().len(),
        gold = session.world().economy.gold,
        "Oath Engine stopped"
    );
    Ok(())
}

/// Load the configuration file, falling back to defaults when it is absent.
///
/// Returns the configuration and whether it came from the file.
fn load_config() -> Result<(OathConfig, bool), EngineError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        return Ok((OathConfig::from_file(path)?, true));
    }
    let mut config = OathConfig::default();
    config.save.apply_env_overrides();
    Ok((config, false))
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
