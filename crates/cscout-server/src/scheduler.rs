//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring maintenance jobs: the timeout sweep, the stale-job redispatch,
//! and the cache sweep.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use cscout_engine::Engine;

/// Jobs still `pending` this long after creation are assumed to have lost
/// their in-process trigger (crash, restart) and are redispatched.
const STALE_PENDING_GRACE_SECS: i64 = 60;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(engine: Arc<Engine>) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_timeout_sweep(&scheduler, Arc::clone(&engine)).await?;
    register_stale_job_redispatch(&scheduler, Arc::clone(&engine)).await?;
    register_cache_sweep(&scheduler, engine).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the deadline sweep, every 30 seconds.
///
/// The read path already times out overdue jobs on access; this sweep covers
/// jobs nobody is polling, so `timeout_at` is honored within roughly half a
/// minute regardless of client behaviour.
async fn register_timeout_sweep(
    scheduler: &JobScheduler,
    engine: Arc<Engine>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("*/30 * * * * *", move |_uuid, _lock| {
        let engine = Arc::clone(&engine);

        Box::pin(async move {
            match cscout_db::timeout_overdue_jobs(&engine.pool).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(count = n, "scheduler: timed out overdue jobs"),
                Err(e) => tracing::error!(error = %e, "scheduler: timeout sweep failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Register the stale-pending redispatch, every minute.
///
/// Each stale job gets its own processing task; the pipeline's claim step
/// makes a redispatch of a job that did get picked up a harmless no-op.
async fn register_stale_job_redispatch(
    scheduler: &JobScheduler,
    engine: Arc<Engine>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let engine = Arc::clone(&engine);

        Box::pin(async move {
            let stale =
                match cscout_db::list_stale_pending_jobs(&engine.pool, STALE_PENDING_GRACE_SECS)
                    .await
                {
                    Ok(rows) => rows,
                    Err(e) => {
                        tracing::error!(error = %e, "scheduler: stale-job query failed");
                        return;
                    }
                };

            if stale.is_empty() {
                return;
            }
            tracing::info!(count = stale.len(), "scheduler: redispatching stale jobs");

            for row in stale {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(error) = engine.process_job(row.id).await {
                        tracing::error!(job_id = %row.id, %error, "scheduler: redispatch failed");
                    }
                });
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Register the in-memory cache sweep, every 5 minutes.
async fn register_cache_sweep(
    scheduler: &JobScheduler,
    engine: Arc<Engine>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
        let engine = Arc::clone(&engine);

        Box::pin(async move {
            let evicted = engine.sweep_caches();
            if evicted > 0 {
                tracing::debug!(evicted, "scheduler: swept expired cache entries");
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
