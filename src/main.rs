use anyhow::{Context, Result};
use clap::Parser;
use enclosure_monitor::cli::Args;
use enclosure_monitor::config::Config;
use enclosure_monitor::hardware;
use enclosure_monitor::http::{self, HttpState};
use enclosure_monitor::node::Node;
use tokio_util::sync::CancellationToken;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,enclosure_monitor=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env()?;
    args.apply(&mut config);
    init_tracing()?;

    tracing::info!(
        hardware = ?config.hardware,
        camera = %config.camera_device,
        log_dir = %config.log_dir.display(),
        "starting enclosure monitor"
    );

    let devices = tokio::task::spawn_blocking({
        let config = config.clone();
        move || hardware::open(&config)
    })
    .await
    .context("hardware probe task failed")?;

    let cancel = CancellationToken::new();
    let (node, report) = Node::start(&config, devices, cancel.clone());
    if !report.is_clean() {
        tracing::warn!(
            failed = report.failures.len(),
            "started with some components unavailable"
        );
    }

    let app = http::router(HttpState { node: node.clone() });
    let listener = tokio::net::TcpListener::bind(&config.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind))?;
    tracing::info!(bind = %config.http_bind, "viewer transport listening");

    let server_cancel = cancel.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await });
    let mut http_handle = tokio::spawn(async move { server.await });

    let server_exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            None
        }
        result = &mut http_handle => Some(result),
    };

    node.shutdown().await;
    let server_exit = match server_exit {
        Some(result) => result,
        None => http_handle.await,
    };
    match server_exit {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "HTTP server exited with error"),
        Err(err) => tracing::warn!(error = %err, "HTTP server task failed"),
    }
    Ok(())
}
