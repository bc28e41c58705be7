//! errata-api - HTTP API server for the errata study notebook

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use errata_api::{router, AppConfig, AppState};
use errata_core::defaults::ADMIN_QUOTA;
use errata_core::{NewUser, QuotaDefaults, SessionRepository, UserRepository};
use errata_crypto::{hash_password, ApiKeyCipher};
use errata_db::{Database, PoolConfig};
use errata_inference::OpenRouterClient;

/// Create the configured admin account if it does not exist yet.
async fn seed_admin(db: &Database, config: &AppConfig) -> anyhow::Result<()> {
    if db.users.username_taken(&config.admin_username).await? {
        return Ok(());
    }
    let password = config.admin_password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    let admin = db
        .users
        .create(
            NewUser {
                username: config.admin_username.clone(),
                email: "admin@localhost".to_string(),
                password_hash,
                is_admin: true,
            },
            QuotaDefaults::uniform(ADMIN_QUOTA, config.quota.refresh_hours),
        )
        .await?;
    info!(user_id = %admin.id, username = %admin.username, "Seeded admin user");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "errata_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "errata_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("errata-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
        None
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = AppConfig::from_env();

    // Database
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    info!("Database connected and migrated");

    tokio::fs::create_dir_all(config.crops_dir()).await?;

    let cipher = match config.encryption_key.as_deref() {
        Some(key) => ApiKeyCipher::from_base64(key)?,
        None => {
            warn!("ENCRYPTION_KEY not set; stored API keys will not survive a restart");
            ApiKeyCipher::generate()
        }
    };

    let openrouter = OpenRouterClient::from_env()?;
    if openrouter.config().api_key.is_empty() {
        warn!("OPENROUTER_API_KEY not set; users without their own key cannot call models");
    }

    seed_admin(&db, &config).await?;
    let purged = db.sessions.purge_expired().await?;
    if purged > 0 {
        info!(result_count = purged, "Purged expired sessions");
    }

    let addr: SocketAddr = config.bind_addr().parse()?;
    let state = AppState::new(db, Arc::new(openrouter), cipher, config);
    let app = router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
