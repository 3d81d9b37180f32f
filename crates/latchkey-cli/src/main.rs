//! `latchkeyd`: door controller daemon.
//!
//! Loads the configuration, wires the devices and remote services, and runs
//! the door runtime until Ctrl-C. Exits non-zero when the runtime stops on a
//! local storage fault.
//!
//! Configuration comes from the TOML file named by `LATCHKEY_CONFIG` (if set)
//! and `LATCHKEY_*` environment overrides.

mod console;

use std::path::PathBuf;

use anyhow::Context;
use latchkey_controller::DoorRuntime;
use latchkey_core::{Config, VERSION};
use latchkey_hardware::mock::{MockButtonPanel, MockRelay, MockTagReader};
use latchkey_network::{HttpSheetClient, SheetClientConfig};
use latchkey_storage::MonthlyMetricsStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::console::Console;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "LATCHKEY_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = VERSION,
        config = ?config_path,
        relay_pin = config.relay_pin,
        unlock_button_pin = config.unlock_button_pin,
        lock_button_pin = config.lock_button_pin,
        "latchkeyd starting"
    );

    // No GPIO or NFC drivers ship in this workspace; the console drives the mocks.
    let (reader, reader_handle) = MockTagReader::new();
    let (relay, _relay_handle) = MockRelay::on_pin(config.relay_pin);
    let (buttons, buttons_handle) = MockButtonPanel::new();

    let mut builder = DoorRuntime::builder(config.clone())
        .with_reader(reader)
        .with_relay(relay)
        .with_buttons(buttons);

    match &config.remote_base_url {
        Some(base_url) => {
            let mut sheet = SheetClientConfig::new(base_url)
                .context("invalid remote_base_url")?
                .with_timeout(config.remote_timeout());
            if let Some(token) = &config.remote_api_token {
                sheet = sheet.with_api_token(token.clone());
            }
            let client = HttpSheetClient::new(&sheet).context("failed to build HTTP client")?;
            info!(badges = %client.badges_url(), log = %client.log_url(), "Remote sheet configured");
            builder = builder
                .with_authorization_source(client.clone())
                .with_log_sink(client);
        }
        None => warn!("remote_base_url not set; running on the fallback badge list"),
    }

    if config.aggregate_enabled {
        builder = builder.with_aggregate(MonthlyMetricsStore::new(config.aggregate_dir.clone()));
    }

    let runtime = builder.build().await.context("failed to start door runtime")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => error!(error = %e, "Ctrl-C handler failed, shutting down"),
            }
            shutdown.cancel();
        }
    });

    // Dropping every reader handle disconnects the mock reader.
    let _reader_handle = reader_handle.clone();
    let console = Console {
        reader: reader_handle,
        buttons: buttons_handle,
        status: runtime.status_reporter(),
        feed: runtime.event_feed(),
        refresh: runtime.refresh_trigger(),
    };
    tokio::spawn(console.run(shutdown.child_token()));

    let result = runtime.run(shutdown.clone()).await;
    shutdown.cancel();

    match result {
        Ok(()) => {
            info!("latchkeyd stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Door runtime failed");
            Err(e).context("door runtime stopped on a fault")
        }
    }
}
