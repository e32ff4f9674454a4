//! trend-scanner: round-robin MA30 trend-turn scanner.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market-data client, scanner, and dashboard, and runs until
//! Ctrl+C.

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info};

use trend_scanner::config::AppConfig;
use trend_scanner::dashboard::{self, routes::DashboardState};
use trend_scanner::data::mexc::MexcClient;
use trend_scanner::engine::scanner::{Scanner, ScannerHandle};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_default()?;

    init_logging();

    let scan_config = cfg
        .scanner
        .scan_config()
        .context("Invalid [scanner.settings] in config")?;
    let base_url = cfg.market_data.resolved_base_url();
    let port = cfg.port()?;
    let ip: IpAddr = cfg
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", cfg.server.bind))?;
    let addr = SocketAddr::new(ip, port);

    info!(
        symbols = scan_config.symbols.len(),
        base_url = %base_url,
        tick_delay_ms = cfg.scanner.tick_delay_ms,
        "trend-scanner starting up"
    );

    // -- Initialise components -------------------------------------------

    let market = MexcClient::new(base_url, cfg.market_data.timeout())?;
    let handle = ScannerHandle::new(scan_config, cfg.scanner.subscriber_queue);
    let scanner = Scanner::new(&handle, Box::new(market), cfg.scanner.options());

    if cfg.scanner.autostart {
        handle.start();
    }

    let state = Arc::new(DashboardState::new(handle.clone()));

    // -- Run -------------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(%addr, "Entering main loop. Press Ctrl+C to stop.");

    tokio::select! {
        _ = scanner.run() => {
            error!("Scanner loop exited unexpectedly");
        }
        result = dashboard::serve(state, addr) => {
            result?;
        }
        _ = &mut shutdown => {
            info!("Shutdown signal received.");
        }
    }

    handle.stop();
    info!("trend-scanner shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trend_scanner=info"));

    let json_logging = std::env::var("SCANNER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
