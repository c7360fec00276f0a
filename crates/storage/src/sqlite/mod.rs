use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{IntroRepository, Storage};

mod intro_repo;
mod migrate;

/// Local state is a handful of flag writes; a small pool is plenty.
const MAX_CONNECTIONS: u32 = 2;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-local state kept in a `SQLite` file next to the binary.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Open the database at `database_url`, creating the file when missing.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` for a malformed URL or an unreachable database.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(BUSY_TIMEOUT)
            .connect_with(options)
            .await?;
        tracing::debug!(database_url, "opened local state database");
        Ok(Self { pool })
    }

    /// Bring the intro-flag schema up to date.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration statement fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Connected and migrated `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Same as [`SqliteRepository::connect`] and [`SqliteRepository::migrate`].
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let intros: Arc<dyn IntroRepository> = Arc::new(repo);
        Ok(Self { intros })
    }
}
