//! Server configuration read from the environment.
//!
//! Every variable has a default so a bare `errata-api` starts against a
//! local database. Unparseable numbers fall back to their defaults.

use std::path::PathBuf;

use axum::http::HeaderValue;
use tracing::warn;

use errata_core::defaults;
use errata_core::QuotaDefaults;

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Root of stored uploads; crops live under `crops/`.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub admin_username: String,
    pub admin_password: String,
    /// Base64 AES-256 key for sealing user API keys. `None` means a per-process key.
    pub encryption_key: Option<String>,
    pub session_ttl_hours: i64,
    /// Quota granted to newly registered users.
    pub quota: QuotaDefaults,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u64,
    pub rate_limit_period_secs: u64,
    pub allowed_origins: Vec<HeaderValue>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/errata".to_string(),
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            upload_dir: PathBuf::from(defaults::UPLOAD_DIR),
            max_upload_bytes: defaults::MAX_BODY_SIZE_BYTES,
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            encryption_key: None,
            session_ttl_hours: defaults::SESSION_TTL_HOURS,
            quota: QuotaDefaults::default(),
            rate_limit_enabled: true,
            rate_limit_requests: defaults::RATE_LIMIT_REQUESTS,
            rate_limit_period_secs: defaults::RATE_LIMIT_PERIOD_SECS,
            allowed_origins: parse_allowed_origins(""),
        }
    }
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            database_url: env_or("DATABASE_URL", d.database_url),
            host: env_or("HOST", d.host),
            port: env_parse("PORT").unwrap_or(d.port),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.upload_dir),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(d.max_upload_bytes),
            admin_username: env_or("ADMIN_USERNAME", d.admin_username),
            admin_password: env_or("ADMIN_PASSWORD", d.admin_password),
            encryption_key: std::env::var("ENCRYPTION_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            session_ttl_hours: env_parse("SESSION_TTL_HOURS").unwrap_or(d.session_ttl_hours),
            quota: QuotaDefaults {
                chat: env_parse("DEFAULT_QUOTA_CHAT").unwrap_or(d.quota.chat),
                images: env_parse("DEFAULT_QUOTA_IMAGES").unwrap_or(d.quota.images),
                quizzes: env_parse("DEFAULT_QUOTA_QUIZZES").unwrap_or(d.quota.quizzes),
                refresh_hours: env_parse("QUOTA_REFRESH_HOURS").unwrap_or(d.quota.refresh_hours),
            },
            rate_limit_enabled: std::env::var("RATE_LIMIT_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(d.rate_limit_enabled),
            rate_limit_requests: env_parse("RATE_LIMIT_REQUESTS").unwrap_or(d.rate_limit_requests),
            rate_limit_period_secs: env_parse("RATE_LIMIT_PERIOD_SECS")
                .unwrap_or(d.rate_limit_period_secs),
            allowed_origins: parse_allowed_origins(
                &std::env::var("ALLOWED_ORIGINS").unwrap_or_default(),
            ),
        }
    }

    /// Directory that holds cropped regions.
    pub fn crops_dir(&self) -> PathBuf {
        self.upload_dir.join(defaults::CROPS_SUBDIR)
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a comma-separated CORS allowlist. Blank input yields the local default.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    if raw.trim().is_empty() {
        return vec![HeaderValue::from_static("http://localhost:3000")];
    }

    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}
