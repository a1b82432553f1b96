use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridge_daemon::api::AppState;
use bridge_daemon::broker::Broker;
use bridge_daemon::config;
use bridge_daemon::registry::ClientRegistry;
use bridge_daemon::server;
use serial_link::{LinkConnector, MockOpener, PortOpener, SerialPortOpener};

#[derive(Parser)]
#[command(name = "serial_bridge", about = "Serial-to-WebSocket bridge daemon")]
struct Cli {
    /// Use a simulated serial device instead of real hardware
    #[arg(long)]
    mock: bool,
    /// Path to the configuration file
    #[arg(long, default_value = "config.json")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bridge_daemon=debug,serial_link=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("serial bridge starting");

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    // --- Link Connector ---
    let opener: Arc<dyn PortOpener> = if cli.mock {
        tracing::info!("using mock serial device");
        Arc::new(MockOpener::default())
    } else {
        tracing::info!(
            "using serial port {} at {} baud",
            config.link.path,
            config.link.baud
        );
        Arc::new(SerialPortOpener::new(config.link.clone()))
    };

    let (event_tx, event_rx) = flume::bounded(256);
    let (connector, link) = LinkConnector::new(
        opener,
        event_tx,
        Duration::from_secs(config.reconnect_delay_secs),
    );
    let link_task = tokio::spawn(connector.run());

    // --- Broadcast Router ---
    let registry = Arc::new(ClientRegistry::new());
    let broker = Arc::new(Broker::new(registry));
    tokio::spawn(broker.clone().run(event_rx));

    // --- Servers ---
    let state = AppState {
        link: link.clone(),
        broker,
    };
    let shutdown = CancellationToken::new();
    let mut server_task = tokio::spawn(server::run(state, config, shutdown.clone()));

    // --- Graceful Shutdown ---
    tokio::select! {
        result = &mut server_task => {
            result.context("server task panicked")??;
            anyhow::bail!("server exited unexpectedly");
        }
        result = wait_for_shutdown_signal() => result?,
    }
    tracing::info!("shutdown signal received, stopping services");

    shutdown.cancel();
    link.shutdown().await; // closes the serial port if open
    let _ = link_task.await;
    server_task.await.context("server task panicked")??;

    tracing::info!("serial bridge stopped gracefully");
    Ok(())
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for ctrl-c")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
