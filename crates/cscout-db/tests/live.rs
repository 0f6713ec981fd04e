//! Live integration tests for cscout-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/cscout-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use cscout_core::{BatchingStats, Creator, JobMetadata, JobStatus, KeywordStrategy};
use cscout_db::{
    complete_search_job, create_search_job, fail_search_job, get_search_job, get_search_result,
    start_search_job, timeout_overdue_jobs, timeout_search_job_if_overdue, update_job_progress,
    upsert_search_result, DbError, NewSearchJob,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_job(timeout_secs: i64) -> NewSearchJob {
    NewSearchJob {
        owner_id: Uuid::new_v4(),
        campaign_id: None,
        platform: "tiktok".to_string(),
        keywords: vec!["coffee roaster".to_string()],
        target_results: 100,
        platform_params: serde_json::json!({}),
        timeout_secs,
    }
}

fn keyword_metadata() -> JobMetadata {
    JobMetadata::KeywordSearch {
        strategy: KeywordStrategy::fallback("coffee roaster"),
        batching: BatchingStats::default(),
        efficiency: 0.5,
    }
}

fn creator(username: &str, keyword: &str) -> Creator {
    Creator {
        platform_id: String::new(),
        external_id: String::new(),
        username: username.to_string(),
        display_name: username.to_string(),
        avatar_url: String::new(),
        bio: String::new(),
        follower_count: 10,
        verified: false,
        source_keyword: keyword.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Lifecycle transitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn create_starts_pending_with_deadline(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(600)).await.expect("create");

    assert_eq!(row.status().unwrap(), JobStatus::Pending);
    assert_eq!(row.progress, 0);
    assert!(row.started_at.is_none());
    assert!(row.timeout_at > row.created_at);
    assert_eq!(row.keywords().unwrap(), vec!["coffee roaster".to_string()]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn start_moves_pending_to_processing_once(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(600)).await.expect("create");

    start_search_job(&pool, row.id).await.expect("first start");
    let started = get_search_job(&pool, row.id).await.expect("get");
    assert_eq!(started.status().unwrap(), JobStatus::Processing);
    assert!(started.started_at.is_some());

    // Redelivered trigger: second start must be rejected, not double-started.
    let err = start_search_job(&pool, row.id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidJobTransition { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn progress_is_monotonic_and_ignored_after_terminal(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(600)).await.expect("create");
    start_search_job(&pool, row.id).await.expect("start");

    assert!(update_job_progress(&pool, row.id, 40, 10, 1).await.expect("update"));
    // A lower progress value must not move the bar backwards.
    assert!(update_job_progress(&pool, row.id, 25, 12, 2).await.expect("update"));
    let mid = get_search_job(&pool, row.id).await.expect("get");
    assert_eq!(mid.progress, 40);
    assert_eq!(mid.processed_results, 12);
    assert_eq!(mid.processed_runs, 2);

    complete_search_job(&pool, row.id, JobStatus::Completed, 12, &keyword_metadata())
        .await
        .expect("complete");

    // Late write after finalization: no-op, reported as such.
    assert!(!update_job_progress(&pool, row.id, 99, 99, 9).await.expect("update"));
    let done = get_search_job(&pool, row.id).await.expect("get");
    assert_eq!(done.progress, 100);
    assert_eq!(done.processed_results, 12);
}

#[sqlx::test(migrations = "../../migrations")]
async fn complete_requires_processing(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(600)).await.expect("create");

    let err = complete_search_job(&pool, row.id, JobStatus::Completed, 5, &keyword_metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidJobTransition { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn complete_persists_typed_metadata(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(600)).await.expect("create");
    start_search_job(&pool, row.id).await.expect("start");
    complete_search_job(&pool, row.id, JobStatus::Partial, 65, &keyword_metadata())
        .await
        .expect("complete");

    let done = get_search_job(&pool, row.id).await.expect("get");
    assert_eq!(done.status().unwrap(), JobStatus::Partial);
    assert!(done.completed_at.is_some());
    let meta = done.metadata().expect("decode").expect("present");
    assert!(matches!(meta, JobMetadata::KeywordSearch { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn fail_persists_message_verbatim(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(600)).await.expect("create");
    start_search_job(&pool, row.id).await.expect("start");

    fail_search_job(&pool, row.id, "all keyword searches failed")
        .await
        .expect("fail");

    let failed = get_search_job(&pool, row.id).await.expect("get");
    assert_eq!(failed.status().unwrap(), JobStatus::Error);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("all keyword searches failed")
    );

    // Error is a sink.
    let err = fail_search_job(&pool, row.id, "again").await.unwrap_err();
    assert!(matches!(err, DbError::InvalidJobTransition { .. }));
}

// ---------------------------------------------------------------------------
// Timeout precedence
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn overdue_processing_job_transitions_to_timeout(pool: sqlx::PgPool) {
    // timeout_secs = 0 makes the deadline pass immediately.
    let row = create_search_job(&pool, &new_job(0)).await.expect("create");
    start_search_job(&pool, row.id).await.expect("start");

    assert!(timeout_search_job_if_overdue(&pool, row.id).await.expect("cas"));
    let timed_out = get_search_job(&pool, row.id).await.expect("get");
    assert_eq!(timed_out.status().unwrap(), JobStatus::Timeout);

    // Second observation: already terminal, no transition.
    assert!(!timeout_search_job_if_overdue(&pool, row.id).await.expect("cas"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn timeout_wins_over_late_finalization(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(0)).await.expect("create");
    start_search_job(&pool, row.id).await.expect("start");
    assert!(timeout_search_job_if_overdue(&pool, row.id).await.expect("cas"));

    // Finalization racing in after the timeout transition must be a no-op.
    let err = complete_search_job(&pool, row.id, JobStatus::Completed, 50, &keyword_metadata())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidJobTransition { .. }));

    let still = get_search_job(&pool, row.id).await.expect("get");
    assert_eq!(still.status().unwrap(), JobStatus::Timeout);
}

#[sqlx::test(migrations = "../../migrations")]
async fn fresh_job_is_not_timed_out(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(3600)).await.expect("create");
    assert!(!timeout_search_job_if_overdue(&pool, row.id).await.expect("cas"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn sweep_times_out_every_overdue_job(pool: sqlx::PgPool) {
    let a = create_search_job(&pool, &new_job(0)).await.expect("create");
    let b = create_search_job(&pool, &new_job(0)).await.expect("create");
    let fresh = create_search_job(&pool, &new_job(3600)).await.expect("create");
    start_search_job(&pool, b.id).await.expect("start");

    let swept = timeout_overdue_jobs(&pool).await.expect("sweep");
    assert_eq!(swept, 2);

    for id in [a.id, b.id] {
        let job = get_search_job(&pool, id).await.expect("get");
        assert_eq!(job.status().unwrap(), JobStatus::Timeout);
    }
    let fresh = get_search_job(&pool, fresh.id).await.expect("get");
    assert_eq!(fresh.status().unwrap(), JobStatus::Pending);
}

// ---------------------------------------------------------------------------
// Idempotent finalization snapshots
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_result_twice_leaves_one_row(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(600)).await.expect("create");

    let first = vec![creator("a", "coffee"), creator("b", "coffee")];
    upsert_search_result(&pool, row.id, &first).await.expect("first upsert");

    let second = vec![creator("a", "coffee")];
    upsert_search_result(&pool, row.id, &second).await.expect("second upsert");

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM search_results WHERE job_id = $1")
            .bind(row.id)
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(count, 1, "finalizing twice must not duplicate the snapshot");

    let stored = get_search_result(&pool, row.id)
        .await
        .expect("get")
        .expect("snapshot exists");
    assert_eq!(stored.creators().unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn missing_result_snapshot_is_none(pool: sqlx::PgPool) {
    let row = create_search_job(&pool, &new_job(600)).await.expect("create");
    assert!(get_search_result(&pool, row.id).await.expect("get").is_none());
}
