use recall_server::channel::TwilioSender;
use recall_server::config::ServerConfig;
use recall_server::error::StartupError;
use recall_server::routes::{AppState, app};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(report) = run().await {
        tracing::error!(error = %report, "server failed to start");
        std::process::exit(1);
    }
}

async fn run() -> recall_core::Result<(), StartupError> {
    let config = ServerConfig::from_env().map_err(|e| StartupError::Configuration {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| StartupError::Database {
            details: e.to_string(),
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| StartupError::Database {
            details: e.to_string(),
        })?;

    let http = reqwest::Client::new();
    let router = recall_server::build_router(&config, db_pool, http.clone())?;
    let channel = TwilioSender::new(http, &config.twilio);
    let state = AppState::new(
        Arc::new(router),
        Arc::new(channel),
        config.inbound.api_key.as_str(),
        config.twilio.auth_token.as_str(),
    );

    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr)
        .await
        .map_err(|e| StartupError::Server {
            details: format!("failed to bind {}: {e}", config.http.bind_addr),
        })?;
    tracing::info!("listening on http://{}", config.http.bind_addr);

    axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Server {
            details: e.to_string(),
        })?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
