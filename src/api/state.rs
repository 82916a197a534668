use std::sync::Arc;

use chrono::Duration;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::{
    config::Config,
    error::{Error, QueryError},
    media::MediaStorage,
};

const MAX_CONNECTIONS: u32 = 10;

/// Everything a handler needs, cloned into each request.
#[derive(Clone)]
pub struct State {
    pub pool: Pool<Postgres>,
    pub config: Arc<Config>,
    pub media: MediaStorage,
    pub secret: Arc<str>,
}

impl State {
    /// Connects to the database and brings the schema up to date.
    pub async fn new(config: Config) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(&config.database_url)
            .await
            .map_err(QueryError::from)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {e}")))?;
        log::info!("Database schema is up to date");

        Ok(Self::with_pool(config, pool))
    }

    pub fn with_pool(config: Config, pool: Pool<Postgres>) -> Self {
        Self {
            media: MediaStorage::new(config.media_root.clone(), config.media_url.clone()),
            secret: Arc::from(config.jwt_secret.as_str()),
            config: Arc::new(config),
            pool,
        }
    }

    /// `Config::load` range-checks the hours; a hand-built config out of range
    /// falls back to a day.
    pub fn token_lifetime(&self) -> Duration {
        Duration::try_hours(self.config.token_lifetime_hours).unwrap_or_else(|| Duration::days(1))
    }
}
