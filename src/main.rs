use anyhow::{Context, Result};
use clap::Parser;
use marketscrape_engine::cli::{setup_logging, Cli};
use marketscrape_engine::config::Config;
use marketscrape_engine::engine::Engine;
use marketscrape_engine::http::build_router;
use marketscrape_engine::metrics::install_recorder;
use marketscrape_engine::readiness;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let config = Config::from_env();
    setup_logging(args.verbose, &config.log_level).map_err(|e| anyhow::anyhow!(e))?;

    info!("starting marketscrape-engine v{}", env!("CARGO_PKG_VERSION"));

    let validation_errors = config.validate();
    if !validation_errors.is_empty() {
        for err in &validation_errors {
            error!("config validation: {err}");
        }
        if config.strict_env_validate {
            anyhow::bail!("configuration validation failed under STRICT_ENV_VALIDATE");
        }
    }

    let prometheus_handle = install_recorder().context("installing prometheus recorder")?;
    let engine = Engine::new(config.clone(), prometheus_handle);

    let _readiness_handle = readiness::spawn(engine.clone());

    let app = build_router(engine.clone());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("parsing API_HOST/API_PORT into a socket address")?;

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("draining in-flight work and closing browser");
    engine.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
