use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use micam_bridge::{
    bind_status_server, Config, FfmpegLauncher, LogFormat, MilocoGateway, PrometheusReporter,
    SessionRegistry, SupervisionLoop, ThroughputProbe,
};

fn init_logging(config: &Config) {
    let default_filter = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }
    let session = config.resolve()?;
    let backoff_policy = config.to_backoff_policy()?;
    let timings = config.to_timings()?;

    PrometheusReporter::init_metrics().context("failed to register metrics")?;

    info!("Starting camera bridge");
    info!("  Camera: {}", session.camera_id());
    info!("  Gateway: {}", session.source().gateway().base_url());
    info!("  Codec: {}", session.source().stream().codec);
    info!("  RTSP sink: {}", session.sink_url_redacted());
    info!("  Status port: {}", config.metrics_port);
    info!(
        "  Backoff: {:?} to {:?}, x{} ±{}%",
        backoff_policy.initial_delay(),
        backoff_policy.max_delay(),
        backoff_policy.multiplier(),
        backoff_policy.jitter() * 100.0
    );

    // Infrastructure adapters (dependency injection)
    let gateway = Arc::new(MilocoGateway::new(
        session.source().gateway().verify_tls(),
    )?);
    let launcher = Arc::new(FfmpegLauncher::new(config.ffmpeg_path.clone(), gateway));
    let probe = Arc::new(ThroughputProbe::new(
        launcher.clone(),
        timings.liveness_window,
        timings.startup_timeout,
    ));
    let metrics = Arc::new(PrometheusReporter::new(session.camera_id()));

    let supervision = SupervisionLoop::new(
        session,
        launcher.clone(),
        probe,
        metrics,
        backoff_policy,
        timings,
    );

    let mut registry = SessionRegistry::new();
    registry.spawn(supervision)?;
    let registry = Arc::new(registry);

    let (server_tx, server_rx) = oneshot::channel::<()>();
    let (addr, server) = bind_status_server(config.metrics_port, registry.clone(), async {
        server_rx.await.ok();
    })
    .with_context(|| format!("failed to bind status server on port {}", config.metrics_port))?;
    info!("Status server listening on http://{}", addr);
    let server = tokio::spawn(server);

    shutdown_signal().await;

    registry.shutdown().await;
    let leftover = launcher.live_processes();
    if leftover > 0 {
        warn!(processes = leftover, "Forwarding processes still registered after shutdown");
    }

    let _ = server_tx.send(());
    server.await?;

    info!("Camera bridge shutdown complete");
    Ok(())
}
