//! Checkpoint table operations
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`
//! suffix) so lexical order on `captured_at` is chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;
use walk_common::{Error, Result};

use crate::models::{Checkpoint, CheckpointFilter};

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn checkpoint_from_row(row: &SqliteRow) -> Result<Checkpoint> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Failed to parse checkpoint id {}: {}", id, e)))?;

    let captured_at: String = row.try_get("captured_at")?;
    let captured_at = DateTime::parse_from_rfc3339(&captured_at)
        .map_err(|e| Error::Internal(format!("Failed to parse captured_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(Checkpoint {
        id,
        captured_at,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        remote_photo_url: row.try_get("remote_photo_url")?,
        local_photo_ref: row.try_get("local_photo_ref")?,
        search_attempted: row.try_get("search_attempted")?,
        download_attempted: row.try_get("download_attempted")?,
        failed: row.try_get("failed")?,
    })
}

/// Insert a new checkpoint
pub async fn insert_checkpoint(pool: &SqlitePool, checkpoint: &Checkpoint) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO checkpoints (
            id, captured_at, latitude, longitude,
            remote_photo_url, local_photo_ref,
            search_attempted, download_attempted, failed
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(checkpoint.id.to_string())
    .bind(format_timestamp(&checkpoint.captured_at))
    .bind(checkpoint.latitude)
    .bind(checkpoint.longitude)
    .bind(&checkpoint.remote_photo_url)
    .bind(&checkpoint.local_photo_ref)
    .bind(checkpoint.search_attempted)
    .bind(checkpoint.download_attempted)
    .bind(checkpoint.failed)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write back the pipeline fields of an existing checkpoint
///
/// Returns `NotFound` if the row vanished (e.g. deleted by a purge).
pub async fn save_checkpoint(pool: &SqlitePool, checkpoint: &Checkpoint) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE checkpoints SET
            remote_photo_url = ?,
            local_photo_ref = ?,
            search_attempted = ?,
            download_attempted = ?,
            failed = ?
        WHERE id = ?
        "#,
    )
    .bind(&checkpoint.remote_photo_url)
    .bind(&checkpoint.local_photo_ref)
    .bind(checkpoint.search_attempted)
    .bind(checkpoint.download_attempted)
    .bind(checkpoint.failed)
    .bind(checkpoint.id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("checkpoint {}", checkpoint.id)));
    }
    Ok(())
}

/// Load one checkpoint by id
pub async fn load_checkpoint(pool: &SqlitePool, id: Uuid) -> Result<Option<Checkpoint>> {
    let row = sqlx::query("SELECT * FROM checkpoints WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(checkpoint_from_row).transpose()
}

/// Load checkpoints matching a filter, oldest first
pub async fn query_checkpoints(
    pool: &SqlitePool,
    filter: CheckpointFilter,
) -> Result<Vec<Checkpoint>> {
    let sql = format!(
        "SELECT * FROM checkpoints WHERE {} ORDER BY captured_at ASC, rowid ASC",
        filter.sql_predicate()
    );

    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(checkpoint_from_row).collect()
}

/// Count checkpoints matching a filter
pub async fn count_checkpoints(pool: &SqlitePool, filter: CheckpointFilter) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM checkpoints WHERE {}",
        filter.sql_predicate()
    );
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(count as u64)
}

/// Delete every checkpoint, returning how many rows went away
pub async fn delete_all_checkpoints(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM checkpoints").execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use chrono::{Duration, SubsecRound};
    use tempfile::TempDir;
    use walk_common::Coordinate;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("walk.db")).await.unwrap();
        (dir, pool)
    }

    fn checkpoint_at(ts: DateTime<Utc>) -> Checkpoint {
        Checkpoint::new(Coordinate::new(52.2297, 21.0122), ts.trunc_subsecs(6))
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let (_dir, pool) = test_pool().await;
        let cp = checkpoint_at(Utc::now());
        insert_checkpoint(&pool, &cp).await.unwrap();

        let loaded = load_checkpoint(&pool, cp.id).await.unwrap().unwrap();
        assert_eq!(loaded, cp);
        assert!(load_checkpoint(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_orders_by_capture_time() {
        let (_dir, pool) = test_pool().await;
        let now = Utc::now();
        let later = checkpoint_at(now + Duration::seconds(30));
        let earlier = checkpoint_at(now);
        insert_checkpoint(&pool, &later).await.unwrap();
        insert_checkpoint(&pool, &earlier).await.unwrap();

        let all = query_checkpoints(&pool, CheckpointFilter::All).await.unwrap();
        let ids: Vec<Uuid> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
    }

    #[tokio::test]
    async fn test_filters_match_model_predicates() {
        let (_dir, pool) = test_pool().await;
        let fresh = checkpoint_at(Utc::now());
        let mut found = checkpoint_at(Utc::now());
        found.remote_photo_url = Some("https://example.com/a.jpg".into());
        found.search_attempted = true;
        let mut failed = checkpoint_at(Utc::now());
        failed.search_attempted = true;
        failed.failed = true;

        for cp in [&fresh, &found, &failed] {
            insert_checkpoint(&pool, cp).await.unwrap();
        }

        let search = query_checkpoints(&pool, CheckpointFilter::SearchEligible).await.unwrap();
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].id, fresh.id);

        let download = query_checkpoints(&pool, CheckpointFilter::DownloadEligible).await.unwrap();
        assert_eq!(download.len(), 1);
        assert_eq!(download[0].id, found.id);

        assert_eq!(count_checkpoints(&pool, CheckpointFilter::Failed).await.unwrap(), 1);
        assert_eq!(count_checkpoints(&pool, CheckpointFilter::WithPhoto).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_missing_checkpoint_is_not_found() {
        let (_dir, pool) = test_pool().await;
        let cp = checkpoint_at(Utc::now());
        let err = save_checkpoint(&pool, &cp).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_all() {
        let (_dir, pool) = test_pool().await;
        insert_checkpoint(&pool, &checkpoint_at(Utc::now())).await.unwrap();
        insert_checkpoint(&pool, &checkpoint_at(Utc::now())).await.unwrap();

        assert_eq!(delete_all_checkpoints(&pool).await.unwrap(), 2);
        assert_eq!(count_checkpoints(&pool, CheckpointFilter::All).await.unwrap(), 0);
    }
}
