//! Serve command - HTTP API plus the reconciliation sweeper

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::create_app_router;
use crate::config::AppConfig;
use crate::domain::RegistryHandle;
use crate::infrastructure::observability::{init_metrics, init_tracing, shutdown_tracing};
use crate::infrastructure::services::CollectionServiceTrait;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging, &config.observability.tracing);
    let metrics = init_metrics(&config.observability.metrics);

    let context = crate::create_app_context(&config).await?;
    let shutdown = CancellationToken::new();

    let sweeper = if config.sweeper.enabled {
        Some(tokio::spawn(
            context.sweeper.clone().run(shutdown.child_token()),
        ))
    } else {
        info!("Reconciliation sweeper disabled");
        None
    };

    tokio::spawn(reload_on_hangup(context.registry.clone(), shutdown.child_token()));

    let app = create_app_router(
        context.state.clone(),
        metrics,
        &config.observability.metrics.path,
    );

    let addr = build_socket_addr(&config)?;
    info!("Starting answer collector API on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    shutdown.cancel();
    context.service.shutdown();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            error!(error = %e, "Sweeper task ended abnormally");
        }
    }
    shutdown_tracing();

    Ok(())
}

fn build_socket_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    )))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Re-reads collector bindings on SIGHUP. Running batches keep the snapshot
/// they started with.
#[cfg(unix)]
async fn reload_on_hangup(registry: Arc<RegistryHandle>, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "Collector reload on SIGHUP unavailable");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            received = hangups.recv() => {
                if received.is_none() {
                    return;
                }
            }
        }

        let reloaded = AppConfig::load()
            .map_err(anyhow::Error::from)
            .and_then(|config| Ok(config.collector_configs()?));

        match reloaded {
            Ok(collectors) => {
                let count = collectors.len();
                let version = registry.reload(collectors);
                info!(version, collectors = count, "Collector registry reloaded");
            }
            Err(e) => error!(error = %e, "Collector reload failed; keeping current registry"),
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_registry: Arc<RegistryHandle>, _shutdown: CancellationToken) {}
