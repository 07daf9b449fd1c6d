use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use landwatch_service::config::Config;
use landwatch_service::services::{GatewayClient, HttpDetector, MemoryImageStore};
use landwatch_service::web::{build_router, AppState};

#[derive(Parser)]
#[command(version, about, long_about = None, name = "Landwatch Service")]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "landwatch_service=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(&args.config)?;
    for dir in [
        &config.storage.upload_dir,
        &config.storage.output_dir,
        &config.ingest.staging_dir,
    ] {
        tokio::fs::create_dir_all(dir).await.into_diagnostic()?;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .into_diagnostic()?;

    let state = AppState::new(
        config.clone(),
        Arc::new(GatewayClient::new(&config.source)),
        Arc::new(HttpDetector::new(&config.detection)),
        Arc::new(MemoryImageStore::new()),
    );
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    info!(%addr, "Starting server");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .into_diagnostic()?;

    state.manager.shutdown().await;
    info!("Graceful shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
