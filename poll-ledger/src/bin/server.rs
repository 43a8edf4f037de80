//! Poll ledger server binary

use anyhow::Result;
use poll_ledger::{Config, Ledger};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting poll ledger server");

    // Load configuration
    let config = Config::from_env()?;
    let sweep = config.sweep.clone();

    // Open ledger
    let ledger = Arc::new(Ledger::open(config).await?);
    tracing::info!("Ledger opened successfully");

    // Log committed lifecycle events as JSON
    let event_task = {
        let mut events = ledger.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(event = %json, "Ledger event"),
                    Err(e) => tracing::warn!("Failed to encode event: {}", e),
                }
            }
        })
    };

    // Background expiry sweep
    let sweep_task = if sweep.enabled {
        let ledger = ledger.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(sweep.interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match ledger.sweep_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(swept = n, "Background sweep"),
                    Err(e) => tracing::error!("Background sweep failed: {}", e),
                }
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down poll ledger server");

    // Stop background work, then the writer; storage closes on drop
    if let Some(task) = sweep_task {
        task.abort();
    }
    event_task.abort();
    ledger.shutdown().await?;

    Ok(())
}
