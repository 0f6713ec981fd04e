//! Database operations for `search_jobs`.
//!
//! Every status transition is a guarded `UPDATE ... WHERE status = ...`
//! statement. Terminal states are sinks: a transition that matches zero rows
//! returns [`DbError::InvalidJobTransition`] and changes nothing, so a late
//! writer can never pull a job out of `completed`, `partial`, `error`, or
//! `timeout`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use cscout_core::{JobMetadata, JobStatus};

use crate::DbError;

const JOB_COLUMNS: &str = "id, owner_id, campaign_id, platform, keywords, target_results, \
     platform_params, status, processed_runs, processed_results, progress, \
     timeout_at, error_message, metadata, created_at, updated_at, started_at, completed_at";

/// A row from the `search_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchJobRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub platform: String,
    pub keywords: serde_json::Value,
    pub target_results: i32,
    pub platform_params: serde_json::Value,
    pub status: String,
    pub processed_runs: i32,
    pub processed_results: i32,
    pub progress: i32,
    pub timeout_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SearchJobRow {
    /// Decodes the status column.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] if the column holds a value outside the
    /// status enum — only possible if the table was written by hand.
    pub fn status(&self) -> Result<JobStatus, DbError> {
        self.status.parse().map_err(|reason| DbError::Decode {
            id: self.id,
            reason,
        })
    }

    /// Decodes the keyword list from its `jsonb` column.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] if the column is not a JSON string array.
    pub fn keywords(&self) -> Result<Vec<String>, DbError> {
        serde_json::from_value(self.keywords.clone()).map_err(|e| DbError::Decode {
            id: self.id,
            reason: format!("keywords column: {e}"),
        })
    }

    /// Decodes the typed metadata union, if any is stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] if the stored blob does not match
    /// [`JobMetadata`].
    pub fn metadata(&self) -> Result<Option<JobMetadata>, DbError> {
        self.metadata
            .clone()
            .map(|v| {
                serde_json::from_value(v).map_err(|e| DbError::Decode {
                    id: self.id,
                    reason: format!("metadata column: {e}"),
                })
            })
            .transpose()
    }

    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.timeout_at
    }
}

/// Fields required to create a job.
#[derive(Debug, Clone)]
pub struct NewSearchJob {
    pub owner_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub platform: String,
    pub keywords: Vec<String>,
    /// Effective target after quota clamping.
    pub target_results: i32,
    pub platform_params: serde_json::Value,
    pub timeout_secs: i64,
}

/// Creates a job in `pending` status with `timeout_at` fixed at creation.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_search_job(pool: &PgPool, new: &NewSearchJob) -> Result<SearchJobRow, DbError> {
    let keywords = serde_json::to_value(&new.keywords).unwrap_or_else(|_| serde_json::json!([]));

    let row = sqlx::query_as::<_, SearchJobRow>(&format!(
        "INSERT INTO search_jobs \
             (owner_id, campaign_id, platform, keywords, target_results, platform_params, \
              status, timeout_at) \
         VALUES ($1, $2, $3, $4, $5, $6, 'pending', NOW() + make_interval(secs => $7::double precision)) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(new.owner_id)
    .bind(new.campaign_id)
    .bind(&new.platform)
    .bind(keywords)
    .bind(new.target_results)
    .bind(&new.platform_params)
    .bind(new.timeout_secs)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a single job by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] on
/// query failure.
pub async fn get_search_job(pool: &PgPool, id: Uuid) -> Result<SearchJobRow, DbError> {
    let row = sqlx::query_as::<_, SearchJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM search_jobs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Transitions `pending → processing` and sets `started_at = NOW()`.
///
/// Safe under redelivery: a second delivery of the same trigger finds the
/// job already `processing` (or terminal) and gets
/// [`DbError::InvalidJobTransition`] instead of double-starting it.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job was not `pending`,
/// or [`DbError::Sqlx`] on query failure.
pub async fn start_search_job(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE search_jobs \
         SET status = 'processing', started_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Updates progress counters while the job is `processing`.
///
/// Progress is monotonic: the stored value only moves forward
/// (`GREATEST(progress, $new)`). Returns `false` when the job is no longer
/// `processing` — the caller treats that as a late-write no-op, not an
/// error.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_job_progress(
    pool: &PgPool,
    id: Uuid,
    progress: i32,
    processed_results: i32,
    processed_runs: i32,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE search_jobs \
         SET progress = GREATEST(progress, $2), \
             processed_results = $3, \
             processed_runs = $4, \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(progress.clamp(0, 100))
    .bind(processed_results)
    .bind(processed_runs)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Finalizes a `processing` job as `completed` or `partial`.
///
/// The statement also requires the deadline to still be in the future, so a
/// job whose `timeout_at` passed during the final batch cannot be finalized
/// as a success; the next status read or sweep moves it to `timeout`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if `outcome` is not one of the
/// two success states, the job was not `processing`, or its deadline has
/// passed, or [`DbError::Sqlx`] on query failure.
pub async fn complete_search_job(
    pool: &PgPool,
    id: Uuid,
    outcome: JobStatus,
    processed_results: i32,
    metadata: &JobMetadata,
) -> Result<(), DbError> {
    if !matches!(outcome, JobStatus::Completed | JobStatus::Partial) {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "completed|partial",
        });
    }

    let metadata = serde_json::to_value(metadata).map_err(|e| DbError::Decode {
        id,
        reason: format!("metadata encode: {e}"),
    })?;

    let result = sqlx::query(
        "UPDATE search_jobs \
         SET status = $2, processed_results = $3, progress = 100, metadata = $4, \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'processing' AND timeout_at > NOW()",
    )
    .bind(id)
    .bind(outcome.as_str())
    .bind(processed_results)
    .bind(metadata)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "processing",
        });
    }

    Ok(())
}

/// Transitions a non-terminal job to `error`, persisting the message verbatim.
///
/// An overdue job is off limits here too: timeout outranks a late error
/// write, same as it outranks a late completion.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job was already
/// terminal or overdue, or [`DbError::Sqlx`] on query failure.
pub async fn fail_search_job(pool: &PgPool, id: Uuid, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE search_jobs \
         SET status = 'error', error_message = $2, completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'processing') AND timeout_at > NOW()",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending|processing",
        });
    }

    Ok(())
}

/// Compare-and-set timeout transition for one job.
///
/// Moves the job to `timeout` iff it is still `pending`/`processing` and its
/// deadline has passed. Returns `true` when the transition happened. This is
/// the read-time hook the status reporter calls before answering, so no two
/// consecutive reads of an overdue job both report `processing`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn timeout_search_job_if_overdue(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE search_jobs \
         SET status = 'timeout', completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'processing') AND timeout_at < NOW()",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Sweep variant of [`timeout_search_job_if_overdue`] covering every overdue
/// job. Returns the number of jobs transitioned.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn timeout_overdue_jobs(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE search_jobs \
         SET status = 'timeout', completed_at = NOW(), updated_at = NOW() \
         WHERE status IN ('pending', 'processing') AND timeout_at < NOW()",
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Returns `pending` jobs created more than `grace_secs` ago.
///
/// The dispatch sweep re-triggers these — the in-process spawn at creation
/// time may have been lost to a crash or restart.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stale_pending_jobs(
    pool: &PgPool,
    grace_secs: i64,
) -> Result<Vec<SearchJobRow>, DbError> {
    let rows = sqlx::query_as::<_, SearchJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM search_jobs \
         WHERE status = 'pending' AND created_at < NOW() - make_interval(secs => $1::double precision) \
         ORDER BY created_at ASC \
         LIMIT 50"
    ))
    .bind(grace_secs)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the most recent jobs for an owner, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_jobs_for_owner(
    pool: &PgPool,
    owner_id: Uuid,
    limit: i64,
) -> Result<Vec<SearchJobRow>, DbError> {
    let rows = sqlx::query_as::<_, SearchJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM search_jobs \
         WHERE owner_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(owner_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
