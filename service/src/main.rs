//! Receipt desk HTTP server.
//!
//! Issues numbered payment receipts, notifies customers by SMS and runs the
//! auditor approval workflow.

use receipt_desk_core::environment::SystemClock;
use receipt_desk_core::notification::NotificationGateway;
use receipt_desk_postgres::{PoolConfig, PostgresDatastore};
use receipt_desk_runtime::metrics::MetricsServer;
use receipt_desk_service::config::Config;
use receipt_desk_service::messages::HtmlReceiptRenderer;
use receipt_desk_service::server::{AppState, build_router};
use receipt_desk_service::services::{ServiceSettings, TicketService};
use receipt_desk_service::sms_gateway::HttpSmsGateway;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.server.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Receipt Desk HTTP Server");
    info!(
        bind = %config.bind_address(),
        receipt_base_url = %config.receipts.base_url,
        send_timeout_secs = config.sms.send_timeout_secs,
        "Configuration loaded"
    );

    // Metrics recorder
    let addr: SocketAddr = config.bind_address().parse()?;
    let metrics = if config.server.metrics_enabled {
        let mut server = MetricsServer::new(addr);
        server.start()?;
        server.handle().cloned()
    } else {
        None
    };

    // Database
    info!("Connecting to database...");
    let store = PostgresDatastore::connect(
        &config.database.url,
        &PoolConfig {
            max_connections: config.database.max_connections,
            min_connections: config.database.min_connections,
            connect_timeout: Duration::from_secs(config.database.connect_timeout),
        },
    )
    .await?;
    store.migrate().await?;
    info!("Database connected and migrated");

    // SMS gateway
    let gateway = HttpSmsGateway::from_config(&config.sms)?;
    if !gateway.is_configured() {
        warn!("SMS gateway is not configured; tickets will be recorded as not delivered");
    }

    let service = TicketService::new(
        Arc::new(store),
        Arc::new(gateway),
        Arc::new(HtmlReceiptRenderer),
        Arc::new(SystemClock),
        &ServiceSettings::from_config(&config),
    );

    let app = build_router(AppState::new(Arc::new(service), metrics));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Server listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
