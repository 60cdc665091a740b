//! docsift HTTP server.
//!
//! ```bash
//! DOCSIFT_CONFIG=docsift.toml RUST_LOG=debug docsift-server
//! ```
//!
//! Real engines are opt-in. The default build has neither engine compiled
//! in: it starts and serves the catalog, but every upload fails with 502.
//! Build with `--features tesseract,onnx` and point `engines.onnx_model_dir`
//! at the ONNX model directory to process documents.

mod config;
mod engines;
mod routes;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::load()?;
    let processor = engines::build_processor(&config)?;
    let app = routes::router(processor, config.max_upload_bytes);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Server listening on http://{}", addr);
    info!("  GET  /health                         - Health check");
    info!("  GET  /api/documents/supported-types  - Document type catalog");
    info!("  POST /api/documents/process          - OCR + field extraction");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
