//! Application entry point.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ops_backend::api::{RateLimitConfig, create_router, create_router_with_rate_limit};
use ops_backend::app::AppState;
use ops_backend::infra::{PostgresClient, PostgresConfig};

/// Application configuration
struct Config {
    database_url: SecretString,
    host: String,
    port: u16,
    run_migrations: bool,
    enable_rate_limiting: bool,
    rate_limit_config: RateLimitConfig,
    db_config: PostgresConfig,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        if database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL environment variable is empty");
        }
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Ok(Self {
            database_url: SecretString::from(database_url),
            host,
            port,
            run_migrations: env_flag("RUN_MIGRATIONS", true),
            enable_rate_limiting: env_flag("ENABLE_RATE_LIMITING", false),
            rate_limit_config: RateLimitConfig::from_env(),
            db_config: PostgresConfig::from_env(),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
    dotenv().ok();
    init_tracing();

    info!("Operations backend v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!(
        max_connections = config.db_config.max_connections,
        "Connecting to database"
    );
    let postgres_client =
        PostgresClient::new(config.database_url.expose_secret(), config.db_config.clone())
            .await
            .context("Failed to connect to database")?;

    if config.run_migrations {
        postgres_client
            .run_migrations()
            .await
            .context("Failed to apply migrations")?;
        info!("Database connected and migrations applied");
    } else {
        info!("Database connected (migrations skipped)");
    }

    let app_state = Arc::new(AppState::new(Arc::new(postgres_client)));

    let router = if config.enable_rate_limiting {
        info!(
            rps = config.rate_limit_config.requests_per_second.get(),
            burst = config.rate_limit_config.burst_size.get(),
            "Rate limiting enabled"
        );
        create_router_with_rate_limit(app_state, config.rate_limit_config)
    } else {
        info!("Rate limiting disabled");
        create_router(app_state)
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Server starting on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);
    info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
