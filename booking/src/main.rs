//! Tablebook scheduler process.
//!
//! Runs the reminder and expiry scheduler over in-memory storage with
//! console transports until Ctrl+C or SIGTERM.

use anyhow::Context;
use std::sync::Arc;
use tablebook::notify::{ConsoleEmailTransport, ConsolePushTransport};
use tablebook::{Config, Tablebook, VenueSeed};
use tablebook_core::environment::SystemClock;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablebook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tablebook::metrics::register_booking_metrics();

    let config = Config::from_env();
    info!(
        sweep_interval_secs = config.scheduler.sweep_interval_secs,
        thresholds = ?config.scheduler.reminder_thresholds,
        delivery_mode = %config.notification.delivery_mode,
        "Configuration loaded"
    );

    let tablebook = Tablebook::in_memory(
        &config,
        Arc::new(ConsolePushTransport::new()),
        Arc::new(ConsoleEmailTransport::new()),
        Arc::new(SystemClock),
    );

    if let Ok(raw) = std::env::var("DEMO_VENUE") {
        let seed = VenueSeed::from_json(&raw).context("DEMO_VENUE is not a valid venue")?;
        seed.register(&tablebook.bookings)
            .await
            .context("DEMO_VENUE was rejected")?;
    }

    tablebook.scheduler.start();
    shutdown_signal().await?;

    info!("Shutting down");
    tablebook.scheduler.stop().await;
    info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C signal");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}
