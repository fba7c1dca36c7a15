use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use elasticache_sd::adapter::FileSdAdapter;
use elasticache_sd::config::Config;
use elasticache_sd::discovery::Discovery;
use elasticache_sd::error::DiscoveryError;
use elasticache_sd::health::HealthServer;
use elasticache_sd::logging;
use elasticache_sd::provider::aws::AwsProvider;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args();
    logging::init(config.log_format, &config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT"),
        build_date = env!("BUILD_DATE"),
        "ElastiCache service discovery starting"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let health = HealthServer::new();
    if config.health_port > 0 {
        start_health_server(health.clone(), config.health_port, cancel.clone()).await;
    }

    let provider = AwsProvider::load(config.fallback_region.as_deref()).await;
    let discovery = match Discovery::new(provider, config.discovery_settings(), &cancel).await {
        Ok(d) => d,
        Err(DiscoveryError::Cancelled) => {
            info!("Shutdown requested before discovery was initialized");
            return Ok(());
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize discovery");
            std::process::exit(1);
        }
    };
    config.display(discovery.identity());

    // Single slot: a send completes once the snapshot is buffered, so discovery
    // runs at most one refresh ahead of the writer
    let (tx, rx) = mpsc::channel(1);
    let adapter = FileSdAdapter::new(&config.output_file, health);

    let discovery_task = tokio::spawn(discovery.run(tx, cancel.clone()));
    adapter.run(rx, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = discovery_task.await {
        error!(error = %e, "Discovery task panicked");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn start_health_server(health: HealthServer, port: u16, cancel: CancellationToken) {
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        if let Err(e) = health.serve(port, tx, cancel).await {
            error!(error = %e, "Health check server failed");
        }
    });

    // Sender is dropped without a value when binding fails
    if let Ok(addr) = rx.await {
        info!(address = %addr, "Health check server initialization complete");
    }
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
        }
        _ = terminate => {}
    }

    info!("Received SIGINT/SIGTERM, initiating graceful shutdown");
    cancel.cancel();
}
