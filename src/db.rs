use crate::error::AppError;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::str::FromStr;

pub type DbPool = Pool<Sqlite>;

pub async fn connect(url: &str, max_connections: u32) -> Result<DbPool, AppError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory database. Every pooled connection to
/// `sqlite::memory:` would otherwise get its own empty database.
pub async fn connect_in_memory() -> Result<DbPool, AppError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

pub async fn init_schema(pool: &DbPool) -> Result<(), AppError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS p1_measurements
        (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            measured_at_ms      INTEGER NOT NULL,
            active_power_w      REAL,
            total_import_kwh    REAL,
            voltage_l1_v        REAL,
            voltage_l2_v        REAL,
            voltage_l3_v        REAL,
            active_current_l1_a REAL,
            active_current_l2_a REAL,
            active_current_l3_a REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_p1_measurements_measured_at ON p1_measurements(measured_at_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM p1_measurements")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_connect_file_database() {
        let path = std::env::temp_dir().join(format!("p1-db-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());

        let pool = connect(&url, 2).await.unwrap();
        init_schema(&pool).await.unwrap();
        pool.close().await;

        assert!(path.exists());
        std::fs::remove_file(&path).ok();
    }
}
