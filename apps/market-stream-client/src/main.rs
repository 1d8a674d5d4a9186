//! Market Stream Client Binary
//!
//! Connects to a quote stream, subscribes to a list of symbols and logs
//! per-symbol updates, with health and metrics served over HTTP.
//!
//! # Usage
//!
//! ```bash
//! STREAM_CLIENT_URL=wss://quotes.example.com/ws \
//! STREAM_CLIENT_SYMBOLS=AAPL,MSFT \
//! cargo run --bin market-stream-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `STREAM_CLIENT_URL`: WebSocket URL of the quote stream
//!
//! ## Optional
//! - `STREAM_CLIENT_TOKEN`: Per-message credential
//! - `STREAM_CLIENT_SYMBOLS`: Comma separated symbols to subscribe to
//! - `STREAM_CLIENT_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `STREAM_CLIENT_*`: Reconnect, heartbeat, batching, compression and
//!   queue tuning (see `ClientConfig::from_env`)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-stream-client)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_stream_client::infrastructure::health::{HealthServer, HealthServerState};
use market_stream_client::infrastructure::telemetry;
use market_stream_client::{
    ClientConfig, EventTopic, Quote, StreamClient, StreamEvent, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("initializing telemetry")?;

    tracing::info!("Starting market stream client");

    let _metrics_handle = init_metrics().context("installing Prometheus recorder")?;

    let config = ClientConfig::from_env().context("loading configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let health_port = config.server.health_port;
    let symbols = config.symbols.clone();

    let client = StreamClient::with_websocket(config);
    register_handlers(&client, &symbols);

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        client.clone(),
    ));
    let health_server = HealthServer::new(health_port, health_state, shutdown_token.clone());

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    client.subscribe_to_keys(symbols.iter().cloned())?;

    // A failed first attempt keeps retrying in the background
    if let Err(e) = client.connect().await {
        tracing::warn!(error = %e, "Initial connection failed");
    }

    tracing::info!(symbols = symbols.len(), "Stream client ready");

    await_shutdown(shutdown_token).await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, client.destroy()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Client already destroyed"),
        Err(_) => tracing::warn!("Timed out destroying stream client"),
    }

    tracing::info!("Stream client stopped");
    Ok(())
}

/// Log lifecycle events and per-symbol quotes.
fn register_handlers(client: &StreamClient, symbols: &[String]) {
    client.on(EventTopic::Connected, |event| {
        if let StreamEvent::Connected { connection_id } = event {
            tracing::info!(%connection_id, "Stream connected");
        }
    });

    client.on(EventTopic::Disconnected, |event| {
        if let StreamEvent::Disconnected { code, reason } = event {
            tracing::warn!(code, reason = %reason, "Stream disconnected");
        }
    });

    client.on(EventTopic::Reconnecting, |event| {
        if let StreamEvent::Reconnecting { attempt, delay } = event {
            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Stream reconnecting"
            );
        }
    });

    client.on(EventTopic::MaxReconnectAttemptsReached, |event| {
        if let StreamEvent::MaxReconnectAttemptsReached { attempts } = event {
            tracing::error!(attempts, "Giving up on reconnecting");
        }
    });

    client.on(EventTopic::Subscribed, |event| {
        if let StreamEvent::Subscribed { keys } = event {
            tracing::info!(?keys, "Subscriptions confirmed");
        }
    });

    for symbol in symbols {
        client.on(EventTopic::key_update(symbol.as_str()), |event| {
            let StreamEvent::KeyUpdate { key, record } = event else {
                return;
            };

            match Quote::from_record(record) {
                Ok(quote) => tracing::info!(
                    symbol = %quote.symbol,
                    price = %quote.price,
                    change_percent = %quote.change_percent,
                    volume = quote.volume,
                    "Quote"
                ),
                Err(e) => tracing::debug!(
                    key = %key,
                    error = %e,
                    fields = record.fields.len(),
                    "Partial quote"
                ),
            }
        });
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        url = %config.connection.url,
        authenticated = config.connection.credentials.is_some(),
        health_port = config.server.health_port,
        symbols = config.symbols.len(),
        "Configuration loaded"
    );
    tracing::debug!(
        reconnect_initial_ms = u64::try_from(config.reconnect.initial_delay.as_millis()).unwrap_or(u64::MAX),
        reconnect_max_ms = u64::try_from(config.reconnect.max_delay.as_millis()).unwrap_or(u64::MAX),
        max_attempts = config.reconnect.max_attempts,
        ping_interval_secs = config.heartbeat.ping_interval.as_secs(),
        pong_timeout_secs = config.heartbeat.pong_timeout.as_secs(),
        batch_max_size = config.batch.max_size,
        compression = config.compression.enabled,
        queue_capacity = config.queue.capacity,
        "Client tuning"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
