//! OpenSASE Storefront - Self-hosted checkout service

use anyhow::Result;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_storefront::{api, AppConfig, AppContext};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let context = AppContext::from_config(&config).await?;

    tokio::spawn(reconcile_periodically(context.clone(), config.reconcile_interval));

    let app = api::router(context);
    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    tracing::info!("🚀 OpenSASE Storefront listening on {}", config.socket_addr());
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn reconcile_periodically(context: AppContext, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match context.reconciler.run_if_enabled().await {
            Ok(Some(report)) if !report.cancelled.is_empty() || !report.failed.is_empty() => {
                tracing::info!(examined = report.examined, cancelled = report.cancelled.len(), failed = report.failed.len(), "reconciliation pass");
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(error = %error, "reconciliation pass failed"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(error = %error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("ctrl_c signal received"),
        () = terminate => tracing::info!("terminate signal received"),
    }
}
