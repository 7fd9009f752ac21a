//! Database initialization
//!
//! Both processes open the same SQLite file. Table creation is idempotent, so
//! whichever process starts first creates the schema.
//!
//! Layout per lane:
//! - `lane_queue`: FIFO rows of JSON-encoded tracks, ordered by `seq`
//! - `lane_state`: `playing` / `paused` / `volume` fields
//! - `lane_now_playing`: one JSON-encoded track
//! - `lane_metadata`: source URL to JSON-encoded track
//! - `recently_played`: bounded playback history

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open (creating if needed) the shared database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Private in-memory database with the full schema.
///
/// Limited to a single connection: every SQLite `:memory:` connection is a
/// separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_lane_queue_table(pool).await?;
    create_lane_state_table(pool).await?;
    create_lane_now_playing_table(pool).await?;
    create_lane_metadata_table(pool).await?;
    create_recently_played_table(pool).await?;
    Ok(())
}

async fn create_lane_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lane_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            lane TEXT NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_lane_queue_lane ON lane_queue(lane, seq)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_lane_state_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lane_state (
            lane TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (lane, field)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lane_now_playing_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lane_now_playing (
            lane TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lane_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lane_metadata (
            lane TEXT NOT NULL,
            url TEXT NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (lane, url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_recently_played_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recently_played (
            guid TEXT PRIMARY KEY,
            guild_id TEXT NOT NULL,
            voice_channel_id TEXT NOT NULL,
            url TEXT NOT NULL,
            title TEXT,
            artist TEXT,
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            thumbnail TEXT,
            added_by TEXT,
            added_by_id TEXT,
            played_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recently_played_lane \
         ON recently_played(guild_id, voice_channel_id, played_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_file_and_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("lanecast.db");

        let pool = init_database(&path).await.unwrap();
        assert!(path.exists());

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'lane_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            tables,
            vec!["lane_metadata", "lane_now_playing", "lane_queue", "lane_state"]
        );
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lanecast.db");

        let first = init_database(&path).await.unwrap();
        first.close().await;
        let second = init_database(&path).await.unwrap();
        create_schema(&second).await.unwrap();
    }
}
