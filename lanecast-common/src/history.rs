//! Recently played history
//!
//! Bounded side-list of tracks accepted into a lane. Each lane keeps at most
//! [`MAX_ENTRIES_PER_LANE`] rows; older rows are trimmed on insert.

use crate::{LaneKey, Result, TrackEntry};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

/// Rows kept per lane
pub const MAX_ENTRIES_PER_LANE: i64 = 100;

/// One history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentlyPlayed {
    pub guid: Uuid,
    pub guild_id: String,
    pub voice_channel_id: String,
    pub track: TrackEntry,
    pub played_at: DateTime<Utc>,
}

/// Insert a history row for `track` and trim the lane to the newest entries
pub async fn record(db: &Pool<Sqlite>, lane: &LaneKey, track: &TrackEntry) -> Result<Uuid> {
    let guid = Uuid::new_v4();
    let played_at = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO recently_played (
            guid, guild_id, voice_channel_id, url, title, artist,
            duration_seconds, thumbnail, added_by, added_by_id, played_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(lane.guild_id())
    .bind(lane.channel_id())
    .bind(&track.url)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(i64::from(track.duration_seconds))
    .bind(&track.thumbnail)
    .bind(&track.requested_by)
    .bind(&track.requested_by_id)
    .bind(played_at.to_rfc3339_opts(SecondsFormat::Micros, true))
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM recently_played
        WHERE guild_id = ? AND voice_channel_id = ?
          AND guid NOT IN (
              SELECT guid FROM recently_played
              WHERE guild_id = ? AND voice_channel_id = ?
              ORDER BY played_at DESC, rowid DESC
              LIMIT ?
          )
        "#,
    )
    .bind(lane.guild_id())
    .bind(lane.channel_id())
    .bind(lane.guild_id())
    .bind(lane.channel_id())
    .bind(MAX_ENTRIES_PER_LANE)
    .execute(db)
    .await?;

    Ok(guid)
}

/// Newest-first history for a lane; `limit` is clamped to `1..=100`
pub async fn list(db: &Pool<Sqlite>, lane: &LaneKey, limit: i64) -> Result<Vec<RecentlyPlayed>> {
    let limit = limit.clamp(1, MAX_ENTRIES_PER_LANE);

    let rows = sqlx::query(
        r#"
        SELECT guid, guild_id, voice_channel_id, url, title, artist,
               duration_seconds, thumbnail, added_by, added_by_id, played_at
        FROM recently_played
        WHERE guild_id = ? AND voice_channel_id = ?
        ORDER BY played_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(lane.guild_id())
    .bind(lane.channel_id())
    .bind(limit)
    .fetch_all(db)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let guid = Uuid::parse_str(&row.get::<String, _>("guid"))
            .map_err(|e| crate::Error::Internal(format!("Bad history guid: {}", e)))?;

        // Unparseable timestamps sort as the epoch rather than failing the listing
        let played_at = DateTime::parse_from_rfc3339(&row.get::<String, _>("played_at"))
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();

        let duration: i64 = row.get("duration_seconds");

        entries.push(RecentlyPlayed {
            guid,
            guild_id: row.get("guild_id"),
            voice_channel_id: row.get("voice_channel_id"),
            track: TrackEntry {
                url: row.get("url"),
                title: row.get::<Option<String>, _>("title").unwrap_or_default(),
                artist: row.get::<Option<String>, _>("artist").unwrap_or_default(),
                duration_seconds: u32::try_from(duration).unwrap_or(0),
                thumbnail: row.get::<Option<String>, _>("thumbnail").unwrap_or_default(),
                requested_by: row.get::<Option<String>, _>("added_by").unwrap_or_default(),
                requested_by_id: row
                    .get::<Option<String>, _>("added_by_id")
                    .unwrap_or_default(),
            },
            played_at,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;

    fn lane() -> LaneKey {
        LaneKey::new("111111111111111111", "222222222222222222").unwrap()
    }

    fn track(n: usize) -> TrackEntry {
        TrackEntry::placeholder(format!("https://youtu.be/track{:06}", n), "dj", "42")
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let db = init_memory_database().await.unwrap();
        let lane = lane();

        record(&db, &lane, &track(1)).await.unwrap();
        record(&db, &lane, &track(2)).await.unwrap();

        let entries = list(&db, &lane, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].track.url, track(2).url);
        assert_eq!(entries[1].track.url, track(1).url);
        assert_eq!(entries[0].track.requested_by, "dj");
    }

    #[tokio::test]
    async fn test_trimmed_to_maximum() {
        let db = init_memory_database().await.unwrap();
        let lane = lane();

        for n in 0..105 {
            record(&db, &lane, &track(n)).await.unwrap();
        }

        let entries = list(&db, &lane, 500).await.unwrap();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].track.url, track(104).url);
    }

    #[tokio::test]
    async fn test_limit_clamped_to_at_least_one() {
        let db = init_memory_database().await.unwrap();
        let lane = lane();

        record(&db, &lane, &track(1)).await.unwrap();
        record(&db, &lane, &track(2)).await.unwrap();

        assert_eq!(list(&db, &lane, 0).await.unwrap().len(), 1);
        assert_eq!(list(&db, &lane, -5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_lanes_not_listed() {
        let db = init_memory_database().await.unwrap();
        let other = LaneKey::new("111111111111111111", "999999999999999999").unwrap();

        record(&db, &lane(), &track(1)).await.unwrap();
        assert!(list(&db, &other, 10).await.unwrap().is_empty());
    }
}
