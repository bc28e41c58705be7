//! Connection pool sizing for the notebook database.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use errata_core::{Error, Result};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT_SECS: u64 = 30;
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Pool limits read from `DB_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Read `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS` and
    /// `DB_CONNECT_TIMEOUT_SECS`, keeping defaults for unset or invalid values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let mut config = Self::default();
        if let Some(n) = parse("DB_MAX_CONNECTIONS") {
            config.max_connections = u32::try_from(n).unwrap_or(u32::MAX).max(1);
        }
        if let Some(n) = parse("DB_MIN_CONNECTIONS") {
            config.min_connections = u32::try_from(n).unwrap_or(u32::MAX);
        }
        // A floor above the ceiling would make sqlx refuse the pool.
        config.min_connections = config.min_connections.min(config.max_connections);
        if let Some(secs) = parse("DB_CONNECT_TIMEOUT_SECS") {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Open a pool with these limits.
    pub async fn connect(&self, database_url: &str) -> Result<PgPool> {
        let start = Instant::now();
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(IDLE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "pool",
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            pool_size = pool.size(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Database pool ready"
        );
        Ok(pool)
    }
}
