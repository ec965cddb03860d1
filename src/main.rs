use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

use vibration_controller::bridge;
use vibration_controller::config::{default_config_path, ServiceConfig};
use vibration_controller::controller::VibratorHandle;
use vibration_controller::vibrator::{EffectCatalog, SimulatedActuator, UsagePriorityPolicy};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = ServiceConfig::load_or_create(&config_path).await?;

    info!("Initializing vibrator controller");
    let handle = VibratorHandle::spawn(
        config.controller_settings(),
        Arc::new(EffectCatalog::new(config.effects)),
        Arc::new(SimulatedActuator::new(config.actuator.rejected)),
        Arc::new(UsagePriorityPolicy::new(config.arbitration)),
    )
    .map_err(|e| eyre!("Failed to spawn vibrator controller: {}", e))?;

    serve_stdio(&handle).await?;

    handle.shutdown().await;
    info!("Vibration controller stopped");
    Ok(())
}

/// Answers bridge requests from stdin until EOF or Ctrl-C
async fn serve_stdio(handle: &VibratorHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Serving bridge requests on stdin");

    loop {
        let line = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            line = lines.next_line() => line.map_err(|e| eyre!("Failed to read stdin: {}", e))?,
        };

        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = bridge::handle_line(handle, &line).await;
        let mut encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode bridge response: {}", e);
                continue;
            }
        };
        encoded.push('\n');
        stdout
            .write_all(encoded.as_bytes())
            .await
            .map_err(|e| eyre!("Failed to write stdout: {}", e))?;
        stdout
            .flush()
            .await
            .map_err(|e| eyre!("Failed to flush stdout: {}", e))?;
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

// stdout carries protocol responses, so logs go to stderr
fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .pretty()
        .init();
}
