//! Parameterised statements against the SQLite store, grouped by table.

use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

pub mod categories;
pub mod clicks;
pub mod links;
pub mod rate_limits;

/// Embedded migrations (files in migrations/).
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a connection pool and bring the schema up to date.
///
/// In-memory databases are per-connection in SQLite, so they get a single
/// connection that lives as long as the pool.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");

    let mut options = database_url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .foreign_keys(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?
    };

    MIGRATOR.run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// True when `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}
