use anyhow::Context;
use common::{TelemetryGuard, setup_logging};
use kiosk::{DisplayHub, Engine, KioskConfig, SERVICE_NAME, display};
use tokio::sync::watch;

fn main() -> anyhow::Result<()> {
    let config = KioskConfig::from_env();

    // TelemetryGuard needs a runtime for its batch exporters, so everything
    // including logging setup runs inside block_on.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: KioskConfig) -> anyhow::Result<()> {
    let telemetry = config
        .otel_endpoint
        .as_deref()
        .map(|endpoint| TelemetryGuard::init(SERVICE_NAME, endpoint, config.environment))
        .transpose()
        .context("Failed to initialize telemetry")?;
    if telemetry.is_none() {
        setup_logging(config.environment);
    }

    tracing::info!("Kiosk starting with config: {:?}", config);

    let listener = tokio::net::TcpListener::bind(config.display.addr)
        .await
        .with_context(|| format!("Failed to bind display server on {}", config.display.addr))?;

    let hub = DisplayHub::new();
    let engine = Engine::new(config.clone(), config.camera.driver(), hub.clone());

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = tokio::spawn(display::run_server(
        listener,
        hub,
        engine.session().clone(),
        async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        },
    ));

    let result = engine.run(shutdown_signal()).await;

    let _ = stop_tx.send(true);
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Display server failed"),
        Err(e) => tracing::error!(error = %e, "Display server task panicked"),
    }

    tracing::info!("Kiosk stopped");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
