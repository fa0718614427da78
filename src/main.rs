//! ==============================================================================
//! main.rs - bio manure monitor entry point
//! ==============================================================================
//!
//! purpose:
//!     polls an esp32 sensor node every 5 seconds for temperature, gas level,
//!     humidity and soil moisture, and serves a live dashboard of the results.
//!
//! responsibilities:
//!     - load configuration (config/monitor.toml + env overrides)
//!     - set up logging
//!     - wire poller -> aggregator -> dashboard
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                      monitor (this file)                    │
//!     │  ┌─────────────┐    apply    ┌─────────────┐                │
//!     │  │   poller    │ ──────────> │ aggregator  │                │
//!     │  │ (5s timer)  │             └──────┬──────┘                │
//!     │  └──┬───────┬──┘                    │ snapshot              │
//!     │     │       │ alerts/refetch ┌──────┴──────┐                │
//!     │     │       └─────────────>  │  dashboard  │ (port 3000)    │
//!     │     │                        └─────────────┘                │
//!     └─────┼───────────────────────────────────────────────────────┘
//!           │ GET /data
//!     ┌─────┴─────┐
//!     │   esp32   │
//!     └───────────┘
//!
//! ==============================================================================

mod aggregator;
mod config;
mod dashboard;
mod domain;
mod poller;

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration (logged through a temporary subscriber,
    // since the real one needs the configured level)
    let config = tracing::subscriber::with_default(
        tracing_subscriber::fmt().finish(),
        config::MonitorConfig::load_or_default,
    );

    // step 2: logging. RUST_LOG wins over the config file.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Bio Manure Monitor v{} starting", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    // step 3: state + alert sink
    let aggregator = aggregator::Aggregator::new();
    let state = aggregator.handle();
    let alerts = dashboard::AlertBoard::default();

    // step 4: start polling
    let device = poller::HttpDevice::new(config.device.endpoint(), config.device.request_timeout())?;
    tracing::info!(
        endpoint = device.endpoint(),
        interval_ms = poller::POLL_INTERVAL.as_millis() as u64,
        "starting sensor polling"
    );
    let poller = poller::Poller::new(device, aggregator, Arc::new(alerts.clone()))
        .show_data(config.logging.show_sensor_data)
        .start(poller::POLL_INTERVAL);

    // step 5: dashboard until ctrl-c
    let dashboard = dashboard::Dashboard::new(state, alerts, poller.clone());
    tokio::select! {
        result = dashboard.serve(&config.server.bind) => {
            poller.stop();
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            poller.stop();
        }
    }

    Ok(())
}
