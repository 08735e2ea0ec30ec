use anyhow::Result;
use axum::Router;
use researcher_core::metrics::init_metrics_from_env;
use researcher_core::{EngineChoice, TelemetryOptions, init_telemetry};
use researcher_server::config::AppConfig;
use researcher_server::routes::build_router;
use researcher_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(TelemetryOptions::default())?;

    let config = AppConfig::from_env()?;
    if config.otel_endpoint.is_some() {
        init_metrics_from_env("researcher-server")?;
    }
    if config.engine == EngineChoice::Scripted {
        warn!("RESEARCHER_ENGINE_PROGRAM not set; serving the built-in scripted engine");
    }
    let state = AppState::try_new(&config)?;

    let app: Router = build_router(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, "researcher-server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            error!(error = %err, "server shutdown with error");
            err
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
