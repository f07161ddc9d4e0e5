//! Retina Classifier - Main Entry Point
//!
//! Loads the classification model once, then serves predictions over HTTP
//! until interrupted.

use anyhow::{Context, Result};
use retina_classifier::{
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, ServiceMetrics},
    server::{self, AppState},
    PredictionService,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_tracing(&config.logging)?;

    info!("Starting Retina Classifier");
    info!(
        model = %config.model.path,
        labels = %config.model.labels_path,
        device = %config.model.device,
        top_k = config.model.top_k,
        "Configuration loaded"
    );

    // Model and labels load on the blocking pool; session creation can take a while
    let model_config = config.clone();
    let service = tokio::task::spawn_blocking(move || PredictionService::from_config(&model_config))
        .await
        .context("Model loading task failed")?;
    let service = Arc::new(service);

    if let Some(reason) = service.host().unavailable_reason() {
        warn!(reason = %reason, "Model unavailable; /predict will return errors");
    }

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());

    // Start metrics reporter
    let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
    tokio::spawn(reporter.start());

    let state = AppState::new(
        service.clone(),
        metrics.clone(),
        config.server.expose_error_details,
    );
    let app = server::router(state, config.server.body_limit_bytes);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("retina_classifier={}", logging.level).parse()?)
        .add_directive(format!("tower_http={}", logging.level).parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
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
