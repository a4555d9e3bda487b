use p1_monitor::{
    api::create_router,
    collector::Collector,
    config::{Config, LogFormat},
    db,
    meter::MeterClient,
    repositories::MeasurementRepository,
    services::QueryService,
    ws::{AppState, Broadcaster},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.yaml".to_string());
    let config = Config::load(&config_path)?;

    init_tracing(config.logging.format);
    info!("Starting p1-monitor");
    info!("Configuration loaded from: {}", config_path);

    // Storage failures at startup are fatal; everything after this is per-cycle.
    let pool = db::connect(&config.database.url, config.database.max_connections).await?;
    db::init_schema(&pool).await?;
    info!("Database ready: {}", config.database.url);

    let store = Arc::new(MeasurementRepository::new(pool));
    let meter = Arc::new(MeterClient::new(&config.meter.host, config.meter.timeout())?);
    info!(url = %meter.url(), interval = ?config.meter.poll_interval(), "meter configured");

    let broadcaster = Broadcaster::new(config.live.subscriber_capacity);
    let collector = Collector::new(
        meter,
        store.clone(),
        broadcaster.clone(),
        config.meter.poll_interval(),
    );
    let collector_status = collector.status();
    let collector_task = tokio::spawn(collector.run());

    let state = Arc::new(AppState::new(
        QueryService::new(store, config.query.clone()),
        broadcaster,
        config.limits.clone(),
        collector_status,
    ));
    let app = create_router(state);

    // Start HTTP server
    let addr = config.bind_address();
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    collector_task.abort();
    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "p1_monitor=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
