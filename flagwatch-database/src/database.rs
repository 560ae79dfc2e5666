use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, migrate::Migrator};
use tracing::info;

use crate::cache::CacheService;

/// Compile-time discovered SQLx migrations for the `flagwatch-database` crate.
pub static MIGRATOR: Migrator = sqlx::migrate!();

const MAX_POOL_CONNECTIONS: u32 = 5;

/// PostgreSQL-backed flag config table plus its read cache.
#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
    cache: CacheService,
}

impl Database {
    /// Open a pool against `database_url` and attach `cache`.
    pub async fn connect(database_url: &str, cache: CacheService) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .connect(database_url)
            .await?;
        info!("PostgreSQL connection established.");

        Ok(Self::with_cache(pool, cache))
    }

    pub fn with_cache(pool: PgPool, cache: CacheService) -> Self {
        Self { pool, cache }
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations applied.");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }
}
