use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::RateLimitWindow;

/// Drop windows that started before `cutoff`. Best-effort housekeeping; the
/// limiter stays correct if this never runs.
pub async fn delete_stale(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM rate_limits WHERE window_start < ?1")
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected)
}

/// Count one request in a single statement.
///
/// - no row, or the row's window started at or before `window_floor`:
///   (re)start the window at `now` with a count of 1;
/// - row inside the window with `request_count < limit`: increment it;
/// - row inside the window at the limit: leave it untouched and return `None`.
///
/// Returns the row as it stands after counting the request.
pub async fn hit(
    pool: &SqlitePool,
    identifier: &str,
    endpoint: &str,
    limit: i64,
    window_floor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<RateLimitWindow>, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO rate_limits (identifier, endpoint, request_count, window_start)
         VALUES (?1, ?2, 1, ?3)
         ON CONFLICT (identifier, endpoint) DO UPDATE SET
             request_count = CASE WHEN rate_limits.window_start > ?4
                                  THEN rate_limits.request_count + 1
                                  ELSE 1 END,
             window_start  = CASE WHEN rate_limits.window_start > ?4
                                  THEN rate_limits.window_start
                                  ELSE excluded.window_start END
         WHERE rate_limits.window_start <= ?4 OR rate_limits.request_count < ?5
         RETURNING identifier, endpoint, request_count, window_start",
    )
    .bind(identifier)
    .bind(endpoint)
    .bind(now)
    .bind(window_floor)
    .bind(limit)
    .fetch_optional(pool)
    .await
}

/// The live window for the pair, if one started after `window_floor`.
pub async fn current_window(
    pool: &SqlitePool,
    identifier: &str,
    endpoint: &str,
    window_floor: DateTime<Utc>,
) -> Result<Option<RateLimitWindow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT identifier, endpoint, request_count, window_start
         FROM rate_limits
         WHERE identifier = ?1 AND endpoint = ?2 AND window_start > ?3",
    )
    .bind(identifier)
    .bind(endpoint)
    .bind(window_floor)
    .fetch_optional(pool)
    .await
}
