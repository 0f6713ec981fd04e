//! Database operations for `search_results` — the per-job result snapshot.
//!
//! A job has at most one snapshot row. That is a soft invariant enforced by
//! the upsert, not by readers: finalization always goes through
//! [`upsert_search_result`], so a redelivered trigger updates the existing
//! row in place instead of inserting a duplicate.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use cscout_core::Creator;

use crate::DbError;

/// A row from the `search_results` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchResultRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub creators: serde_json::Value,
    pub snapshot_at: DateTime<Utc>,
}

impl SearchResultRow {
    /// Decodes the stored creator list.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] if the `creators` column is not a creator
    /// array.
    pub fn creators(&self) -> Result<Vec<Creator>, DbError> {
        serde_json::from_value(self.creators.clone()).map_err(|e| DbError::Decode {
            id: self.job_id,
            reason: format!("creators column: {e}"),
        })
    }
}

/// Inserts or replaces the result snapshot for a job.
///
/// Conflicts on `job_id` overwrite `creators` and `snapshot_at` in place —
/// invoking finalization twice leaves exactly one row.
///
/// # Errors
///
/// Returns [`DbError::Decode`] if the creator list does not encode, or
/// [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_search_result(
    pool: &PgPool,
    job_id: Uuid,
    creators: &[Creator],
) -> Result<(), DbError> {
    let creators = serde_json::to_value(creators).map_err(|e| DbError::Decode {
        id: job_id,
        reason: format!("creators encode: {e}"),
    })?;

    sqlx::query(
        "INSERT INTO search_results (job_id, creators, snapshot_at) \
         VALUES ($1, $2, NOW()) \
         ON CONFLICT (job_id) DO UPDATE SET \
             creators    = EXCLUDED.creators, \
             snapshot_at = EXCLUDED.snapshot_at",
    )
    .bind(job_id)
    .bind(creators)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches the result snapshot for a job, if one exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_search_result(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Option<SearchResultRow>, DbError> {
    let row = sqlx::query_as::<_, SearchResultRow>(
        "SELECT id, job_id, creators, snapshot_at \
         FROM search_results \
         WHERE job_id = $1",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
