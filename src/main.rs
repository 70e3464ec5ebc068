use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ticker_feed::config::Config;
use ticker_feed::console::{run_console, run_frame_logger};
use ticker_feed::engine::{FeedEngine, UserCommand};
use ticker_feed::market_data::adapters::websocket::WsTransport;
use ticker_feed::market_data::market_worker::run_feed_worker;
use ticker_feed::metrics;

/// Transport→engine channel buffer.
const ADAPTER_CHANNEL_BUFFER: usize = 4_096;
const COMMAND_CHANNEL_BUFFER: usize = 64;
const FRAME_CHANNEL_BUFFER: usize = 16;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    if let Some(port) = config.metrics_port {
        metrics::init_metrics_server(port)?;
    }

    info!(
        url = %config.ws_api_url,
        throttle = %config.throttle_default,
        "ticker-feed starting"
    );

    let (notice_tx, notice_rx) = mpsc::channel(ADAPTER_CHANNEL_BUFFER);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_BUFFER);

    let engine = FeedEngine::new(&config, WsTransport::new(notice_tx));
    let (status_tx, status_rx) = watch::channel(engine.status());

    let mut worker_handle = tokio::spawn(run_feed_worker(engine, notice_rx, command_rx, frame_tx, status_tx));
    let renderer_handle = tokio::spawn(run_frame_logger(frame_rx));
    let console_handle = tokio::spawn(run_console(command_tx.clone(), status_rx));

    tokio::select! {
        res = &mut worker_handle => {
            match res {
                Ok(Ok(())) => info!("feed worker exited"),
                Ok(Err(err)) => warn!(error = %err, "feed worker returned error"),
                Err(err) => warn!(error = %err, "feed worker task panicked"),
            }
        }
        res = console_handle => {
            match res {
                Ok(Ok(())) => info!("console closed"),
                Ok(Err(err)) => warn!(error = %err, "console returned error"),
                Err(err) => warn!(error = %err, "console task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    // The worker stops on Shutdown; wait for it so the socket closes cleanly.
    if !worker_handle.is_finished() {
        let _ = command_tx.send(UserCommand::Shutdown).await;
        let _ = worker_handle.await;
    }
    let _ = renderer_handle.await;

    Ok(())
}
