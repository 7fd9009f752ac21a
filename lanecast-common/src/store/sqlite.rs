//! SQLite-backed queue store
//!
//! Every operation is a single SQL statement, so each is atomic even with
//! several processes sharing the database file.

use super::{QueueStore, DEFAULT_VOLUME};
use crate::{Error, LaneKey, Result, TrackEntry};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::warn;

const FIELD_PLAYING: &str = "playing";
const FIELD_PAUSED: &str = "paused";
const FIELD_VOLUME: &str = "volume";

/// [`QueueStore`] over the shared SQLite database
#[derive(Clone)]
pub struct SqliteQueueStore {
    db: SqlitePool,
}

impl SqliteQueueStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    async fn write_field(&self, lane: &LaneKey, field: &str, value: String) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lane_state (lane, field, value) VALUES (?, ?, ?)
            ON CONFLICT(lane, field) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(lane.storage_key())
        .bind(field)
        .bind(value)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn read_field(&self, lane: &LaneKey, field: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM lane_state WHERE lane = ? AND field = ?",
        )
        .bind(lane.storage_key())
        .bind(field)
        .fetch_optional(&self.db)
        .await?;
        Ok(value)
    }

    async fn read_bool(&self, lane: &LaneKey, field: &str) -> Result<bool> {
        Ok(self.read_field(lane, field).await?.as_deref() == Some("1"))
    }
}

fn bool_string(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn encode_track(track: &TrackEntry) -> Result<String> {
    Ok(serde_json::to_string(track)?)
}

fn decode_track(payload: &str) -> Result<TrackEntry> {
    if payload.is_empty() {
        return Err(Error::Internal("empty track payload".to_string()));
    }
    Ok(serde_json::from_str(payload)?)
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn append(&self, lane: &LaneKey, track: &TrackEntry) -> Result<()> {
        let payload = encode_track(track)?;
        sqlx::query("INSERT INTO lane_queue (lane, payload) VALUES (?, ?)")
            .bind(lane.storage_key())
            .bind(payload)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn pop_next(&self, lane: &LaneKey) -> Result<Option<TrackEntry>> {
        let payload = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM lane_queue
            WHERE seq = (SELECT seq FROM lane_queue WHERE lane = ? ORDER BY seq ASC LIMIT 1)
            RETURNING payload
            "#,
        )
        .bind(lane.storage_key())
        .fetch_optional(&self.db)
        .await?;

        payload.as_deref().map(decode_track).transpose()
    }

    async fn snapshot(&self, lane: &LaneKey) -> Result<Vec<TrackEntry>> {
        let payloads = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM lane_queue WHERE lane = ? ORDER BY seq ASC",
        )
        .bind(lane.storage_key())
        .fetch_all(&self.db)
        .await?;

        payloads.iter().map(|p| decode_track(p)).collect()
    }

    async fn remove_at(&self, lane: &LaneKey, index: usize) -> Result<()> {
        let offset = i64::try_from(index)
            .map_err(|_| Error::InvalidInput(format!("index {} too large", index)))?;

        let result = sqlx::query(
            r#"
            DELETE FROM lane_queue
            WHERE seq = (
                SELECT seq FROM lane_queue WHERE lane = ?
                ORDER BY seq ASC LIMIT 1 OFFSET ?
            )
            "#,
        )
        .bind(lane.storage_key())
        .bind(offset)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            let len = self.length(lane).await?;
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    async fn clear(&self, lane: &LaneKey) -> Result<()> {
        sqlx::query("DELETE FROM lane_queue WHERE lane = ?")
            .bind(lane.storage_key())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn length(&self, lane: &LaneKey) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lane_queue WHERE lane = ?")
            .bind(lane.storage_key())
            .fetch_one(&self.db)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn save_metadata(&self, lane: &LaneKey, url: &str, track: &TrackEntry) -> Result<()> {
        let payload = encode_track(track)?;
        sqlx::query(
            r#"
            INSERT INTO lane_metadata (lane, url, payload) VALUES (?, ?, ?)
            ON CONFLICT(lane, url) DO UPDATE SET payload = excluded.payload
            "#,
        )
        .bind(lane.storage_key())
        .bind(url)
        .bind(payload)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn lookup_metadata(&self, lane: &LaneKey, url: &str) -> Result<Option<TrackEntry>> {
        let payload = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM lane_metadata WHERE lane = ? AND url = ?",
        )
        .bind(lane.storage_key())
        .bind(url)
        .fetch_optional(&self.db)
        .await?;

        payload.as_deref().map(decode_track).transpose()
    }

    async fn clear_metadata(&self, lane: &LaneKey) -> Result<()> {
        sqlx::query("DELETE FROM lane_metadata WHERE lane = ?")
            .bind(lane.storage_key())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn set_now_playing(&self, lane: &LaneKey, track: Option<&TrackEntry>) -> Result<()> {
        match track {
            Some(track) => {
                let payload = encode_track(track)?;
                sqlx::query(
                    r#"
                    INSERT INTO lane_now_playing (lane, payload) VALUES (?, ?)
                    ON CONFLICT(lane) DO UPDATE SET payload = excluded.payload
                    "#,
                )
                .bind(lane.storage_key())
                .bind(payload)
                .execute(&self.db)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM lane_now_playing WHERE lane = ?")
                    .bind(lane.storage_key())
                    .execute(&self.db)
                    .await?;
            }
        }
        Ok(())
    }

    async fn get_now_playing(&self, lane: &LaneKey) -> Result<Option<TrackEntry>> {
        let payload = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM lane_now_playing WHERE lane = ?",
        )
        .bind(lane.storage_key())
        .fetch_optional(&self.db)
        .await?;

        payload.as_deref().map(decode_track).transpose()
    }

    async fn set_playing(&self, lane: &LaneKey, value: bool) -> Result<()> {
        self.write_field(lane, FIELD_PLAYING, bool_string(value)).await
    }

    async fn is_playing(&self, lane: &LaneKey) -> Result<bool> {
        self.read_bool(lane, FIELD_PLAYING).await
    }

    async fn set_paused(&self, lane: &LaneKey, value: bool) -> Result<()> {
        self.write_field(lane, FIELD_PAUSED, bool_string(value)).await
    }

    async fn is_paused(&self, lane: &LaneKey) -> Result<bool> {
        self.read_bool(lane, FIELD_PAUSED).await
    }

    async fn set_volume(&self, lane: &LaneKey, factor: f64) -> Result<()> {
        self.write_field(lane, FIELD_VOLUME, format!("{:.6}", factor)).await
    }

    async fn get_volume(&self, lane: &LaneKey) -> Result<f64> {
        match self.read_field(lane, FIELD_VOLUME).await? {
            None => Ok(DEFAULT_VOLUME),
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) => Ok(value),
                Err(_) => {
                    warn!(lane = %lane, value = %raw, "Unparseable stored volume, using default");
                    Ok(DEFAULT_VOLUME)
                }
            },
        }
    }
}
