use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// File name of the SQLite database inside `database.db_location`.
pub const DB_FILE: &str = "search.sqlite";

pub async fn connect(db_location: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(db_location).with_context(|| {
        format!(
            "Failed to create database directory: {}",
            db_location.display()
        )
    })?;

    let db_path = db_location.join(DB_FILE);
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            document TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_external_id ON records(collection, external_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
