//! The job pipeline: claim, expand, fan out, fan in, finalize.
//!
//! [`Engine::process_job`] is the single entry point for every trigger
//! source — the spawn at creation time, the redispatch sweep, and manual
//! re-triggers. Delivery is at-least-once, so every step is written to be
//! safe under duplication: the claim is a guarded `pending → processing`
//! transition, progress only moves forward, and terminal states are sinks.
//! Validation and search failures become the job's terminal status; only
//! persistence loss propagates as an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use uuid::Uuid;

use cscout_core::{
    AppConfig, BatchingStats, Creator, JobMetadata, JobStatus, Platform, MAX_COMBINED_KEYWORDS,
};
use cscout_db::{self as db, DbError, SearchJobRow};
use cscout_discovery::{DiscoveryClient, HandlerRegistry};

use crate::aggregate::{aggregate, efficiency};
use crate::analytics::{AnalyticsEvent, AnalyticsQueue};
use crate::batch::{plan_batches, run_batch, AdaptiveDelay, BatchSettings};
use crate::cache::{MemoryTtlCache, TtlCache};
use crate::error::{BuildError, EngineError};
use crate::expansion::{ExpansionEngine, GenerationClient};
use crate::retry::{search_with_retry, KeywordOutcome, RetryPolicy};

/// Everything one worker needs to run jobs end to end.
pub struct Engine {
    pub pool: PgPool,
    pub discovery: Arc<DiscoveryClient>,
    pub registry: Arc<HandlerRegistry>,
    pub expansion: ExpansionEngine,
    pub result_cache: Arc<dyn TtlCache<Vec<Creator>>>,
    pub retry: RetryPolicy,
    pub batching: BatchSettings,
    pub analytics: AnalyticsQueue,
}

impl Engine {
    /// Wires the engine from app config: HTTP clients, default platform
    /// registry, and both in-memory caches.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if either HTTP client cannot be constructed.
    pub fn from_app_config(
        config: &AppConfig,
        pool: PgPool,
        analytics: AnalyticsQueue,
    ) -> Result<Self, BuildError> {
        let discovery = DiscoveryClient::with_base_url(
            config.discovery_api_key.as_deref(),
            config.discovery_request_timeout_secs,
            &config.discovery_base_url,
        )?;
        let generation = GenerationClient::with_base_url(
            config.generation_api_key.as_deref(),
            &config.generation_model,
            config.discovery_request_timeout_secs,
            &config.generation_base_url,
        )?;

        let ttl = Duration::from_secs(config.cache_ttl_secs);
        let max_age = Duration::from_secs(config.cache_sweep_max_age_secs);
        let strategy_cache = Arc::new(MemoryTtlCache::new(ttl, max_age));
        let result_cache: Arc<dyn TtlCache<Vec<Creator>>> =
            Arc::new(MemoryTtlCache::new(ttl, max_age));

        Ok(Self {
            pool,
            discovery: Arc::new(discovery),
            registry: Arc::new(HandlerRegistry::with_defaults()),
            expansion: ExpansionEngine::new(Arc::new(generation), strategy_cache),
            result_cache,
            retry: RetryPolicy::from_app_config(config),
            batching: BatchSettings::from_app_config(config),
            analytics,
        })
    }

    /// Evicts aged entries from both caches. Returns how many were dropped.
    pub fn sweep_caches(&self) -> usize {
        self.result_cache.sweep() + self.expansion.sweep_cache()
    }

    /// Processes one job to a terminal state.
    ///
    /// Idempotent under redelivery: a terminal or already-claimed job is a
    /// logged no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] only when the persistence layer itself
    /// fails; every search-side failure lands in the job record instead.
    pub async fn process_job(&self, job_id: Uuid) -> Result<(), EngineError> {
        let job = db::get_search_job(&self.pool, job_id).await?;
        let status = job.status()?;

        if status.is_terminal() {
            tracing::debug!(%job_id, %status, "job already terminal; trigger ignored");
            return Ok(());
        }
        if db::timeout_search_job_if_overdue(&self.pool, job_id).await? {
            tracing::info!(%job_id, "job deadline already passed; marked timeout");
            return Ok(());
        }
        match db::start_search_job(&self.pool, job_id).await {
            Ok(()) => {}
            Err(DbError::InvalidJobTransition { .. }) => {
                tracing::warn!(%job_id, "job is not pending; assuming another trigger owns it");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.run_claimed_job(&job).await
    }

    async fn run_claimed_job(&self, job: &SearchJobRow) -> Result<(), EngineError> {
        let job_id = job.id;

        let keywords = match job.keywords() {
            Ok(keywords) => keywords,
            Err(e) => {
                self.fail(job_id, &format!("invalid keyword payload: {e}")).await?;
                return Ok(());
            }
        };
        let Some(seed) = keywords
            .first()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
        else {
            self.fail(job_id, "job has no usable keywords").await?;
            return Ok(());
        };
        let platform: Platform = match job.platform.parse() {
            Ok(platform) => platform,
            Err(reason) => {
                self.fail(job_id, &reason).await?;
                return Ok(());
            }
        };
        let Some(handler) = self.registry.get(platform) else {
            self.fail(job_id, &format!("no search handler registered for {platform}"))
                .await?;
            return Ok(());
        };

        let strategy = self
            .expansion
            .expand(&seed, platform, handler.expansion_hint())
            .await;
        let working = merge_keywords(&keywords, &strategy.combined);
        let target = usize::try_from(job.target_results).unwrap_or(0).max(1);

        // Strategy in hand; the rest of the progress bar belongs to batches.
        db::update_job_progress(&self.pool, job_id, 10, 0, 0).await?;

        let plan = plan_batches(&working, target);
        let per_keyword_target = plan.per_keyword_target;
        let batch_count = plan.batches.len();
        let stagger = Duration::from_millis(self.batching.stagger_ms);
        let mut delay = AdaptiveDelay::new(&self.batching);
        let mut wait = Duration::ZERO;
        let mut outcomes: Vec<KeywordOutcome> = Vec::with_capacity(working.len());

        tracing::info!(
            %job_id,
            %platform,
            keywords = working.len(),
            batch_size = plan.batch_size,
            batch_count,
            per_keyword_target,
            "starting keyword fan-out"
        );

        for (index, batch) in plan.batches.iter().enumerate() {
            if index > 0 && !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            // The deadline is re-checked between batches so a long-running
            // job stops burning quota once it has already timed out.
            if db::timeout_search_job_if_overdue(&self.pool, job_id).await? {
                tracing::warn!(%job_id, "deadline passed between batches; abandoning remaining work");
                self.analytics.record(AnalyticsEvent::JobFinished {
                    job_id,
                    status: JobStatus::Timeout.to_string(),
                    unique_creators: 0,
                    api_calls: outcomes.iter().map(|o| o.api_calls).sum(),
                    efficiency: 0.0,
                });
                return Ok(());
            }

            let started = Instant::now();
            let batch_outcomes = run_batch(batch, stagger, |keyword| async move {
                search_with_retry(
                    &self.discovery,
                    handler,
                    self.result_cache.as_ref(),
                    &self.retry,
                    &keyword,
                    per_keyword_target,
                )
                .await
            })
            .await;

            let failed_in_batch = batch_outcomes.iter().filter(|o| !o.succeeded()).count();
            wait = delay.observe(failed_in_batch, started.elapsed());
            outcomes.extend(batch_outcomes);

            let unique_so_far = aggregate(&outcomes, target).creators.len();
            let still_processing = db::update_job_progress(
                &self.pool,
                job_id,
                progress_after_batch(index + 1, batch_count),
                i32::try_from(unique_so_far).unwrap_or(i32::MAX),
                i32::try_from(index + 1).unwrap_or(i32::MAX),
            )
            .await?;
            if !still_processing {
                tracing::warn!(%job_id, "job left processing state mid-flight; abandoning");
                return Ok(());
            }
        }

        let total_api_calls: u64 = outcomes.iter().map(|o| o.api_calls).sum();
        let failed_keywords = outcomes.iter().filter(|o| !o.succeeded()).count();
        let agg = aggregate(&outcomes, target);
        let unique = agg.creators.len();
        let status = decide_outcome(failed_keywords, unique);

        if status == JobStatus::Error {
            let message = if failed_keywords == outcomes.len() {
                "all keyword searches failed".to_owned()
            } else {
                "failed keyword searches left no creators".to_owned()
            };
            self.fail(job_id, &message).await?;
            self.analytics.record(AnalyticsEvent::JobFinished {
                job_id,
                status: status.to_string(),
                unique_creators: 0,
                api_calls: total_api_calls,
                efficiency: 0.0,
            });
            return Ok(());
        }

        // Snapshot before finalizing so a completed/partial status always
        // implies a readable snapshot.
        db::upsert_search_result(&self.pool, job_id, &agg.creators).await?;

        let eff = efficiency(unique, total_api_calls);
        let metadata = JobMetadata::KeywordSearch {
            strategy,
            batching: BatchingStats {
                batch_size: plan.batch_size,
                batch_count,
                total_api_calls,
                failed_keywords,
                duplicates_removed: agg.duplicates_removed,
                keyword_yields: agg.keyword_yields,
            },
            efficiency: eff,
        };

        match db::complete_search_job(
            &self.pool,
            job_id,
            status,
            i32::try_from(unique).unwrap_or(i32::MAX),
            &metadata,
        )
        .await
        {
            Ok(()) => {}
            Err(DbError::InvalidJobTransition { .. }) => {
                tracing::warn!(%job_id, "finalization lost to a timeout; snapshot kept, status stands");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(%job_id, %status, unique, total_api_calls, "job finished");
        self.analytics.record(AnalyticsEvent::JobFinished {
            job_id,
            status: status.to_string(),
            unique_creators: unique,
            api_calls: total_api_calls,
            efficiency: eff,
        });
        Ok(())
    }

    /// Marks the job `error`, tolerating a concurrent terminal transition.
    async fn fail(&self, job_id: Uuid, message: &str) -> Result<(), EngineError> {
        match db::fail_search_job(&self.pool, job_id, message).await {
            Ok(()) => {
                tracing::warn!(%job_id, message, "job failed");
                Ok(())
            }
            Err(DbError::InvalidJobTransition { .. }) => {
                tracing::warn!(%job_id, message, "job already terminal; error not recorded");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// The working keyword list: user keywords first (they are authoritative),
/// then expansion output, case-insensitively deduplicated and capped.
fn merge_keywords(user: &[String], expanded: &[String]) -> Vec<String> {
    let mut combined: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for candidate in user.iter().chain(expanded) {
        if combined.len() >= MAX_COMBINED_KEYWORDS {
            break;
        }
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        let folded = candidate.to_lowercase();
        if seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        combined.push(candidate.to_owned());
    }
    combined
}

/// Progress lands at 10 after expansion and walks to 95 across batches;
/// finalization owns the last 5 points.
fn progress_after_batch(done: usize, total: usize) -> i32 {
    let total = total.max(1);
    let walked = 85 * done.min(total) / total;
    i32::try_from(10 + walked).unwrap_or(95)
}

/// `completed` means every keyword search ran to a clean conclusion, even
/// one that found nobody; `error` is reserved for runs where failures are
/// the reason the result set is empty.
fn decide_outcome(failed_keywords: usize, unique: usize) -> JobStatus {
    if failed_keywords == 0 {
        JobStatus::Completed
    } else if unique > 0 {
        JobStatus::Partial
    } else {
        JobStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn merge_puts_user_keywords_first() {
        let merged = merge_keywords(
            &strings(&["coffee roaster", "espresso"]),
            &strings(&["coffee roaster", "latte art", "Espresso"]),
        );
        assert_eq!(merged, vec!["coffee roaster", "espresso", "latte art"]);
    }

    #[test]
    fn merge_caps_the_working_list() {
        let expanded: Vec<String> = (0..20).map(|i| format!("expanded {i}")).collect();
        let merged = merge_keywords(&strings(&["seed"]), &expanded);
        assert_eq!(merged.len(), MAX_COMBINED_KEYWORDS);
        assert_eq!(merged[0], "seed");
    }

    #[test]
    fn merge_skips_blank_candidates() {
        let merged = merge_keywords(&strings(&["  ", "coffee"]), &strings(&["", "tea"]));
        assert_eq!(merged, vec!["coffee", "tea"]);
    }

    #[test]
    fn progress_walks_from_expansion_to_finalization() {
        assert_eq!(progress_after_batch(1, 3), 38);
        assert_eq!(progress_after_batch(2, 3), 66);
        assert_eq!(progress_after_batch(3, 3), 95);
        assert_eq!(progress_after_batch(1, 1), 95);
        // Degenerate plans never exceed the pre-finalization ceiling.
        assert_eq!(progress_after_batch(5, 3), 95);
    }

    #[test]
    fn outcome_policy_matches_lifecycle_rules() {
        assert_eq!(decide_outcome(0, 65), JobStatus::Completed);
        assert_eq!(decide_outcome(1, 65), JobStatus::Partial);
        assert_eq!(decide_outcome(3, 0), JobStatus::Error);
        // A clean run that found nobody is still a clean run.
        assert_eq!(decide_outcome(0, 0), JobStatus::Completed);
    }
}
