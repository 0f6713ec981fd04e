//! Batch planning and execution for the keyword fan-out.
//!
//! Concurrency scales inversely with the requested volume: small jobs fan
//! out wide, large jobs run nearly sequential so a single job cannot
//! monopolize upstream quota. Within a batch, starts are staggered a fixed
//! interval apart; between batches an adaptive delay reacts to how the
//! previous batch went.

use std::future::Future;
use std::time::Duration;

use cscout_core::AppConfig;

use crate::retry::KeywordOutcome;

/// A batch finishing faster than this, with no failures, is evidence the
/// upstream has headroom and the inter-batch delay can shrink.
const FAST_BATCH: Duration = Duration::from_secs(2);

/// Ceiling on how far the adaptive delay may grow, as a multiple of its
/// starting value.
const MAX_DELAY_GROWTH: u64 = 8;

/// Keyword concurrency for a requested result volume.
#[must_use]
pub fn batch_size_for_target(target: usize) -> usize {
    match target {
        0..=50 => 4,
        51..=100 => 3,
        101..=250 => 2,
        _ => 1,
    }
}

/// Even split of the job target across keywords, rounded up so the union
/// can reach the target even with overlap between keywords.
#[must_use]
pub fn per_keyword_target(total: usize, keyword_count: usize) -> usize {
    total.div_ceil(keyword_count.max(1))
}

/// The fan-out plan for one job.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub per_keyword_target: usize,
    pub batches: Vec<Vec<String>>,
}

#[must_use]
pub fn plan_batches(keywords: &[String], target: usize) -> BatchPlan {
    let batch_size = batch_size_for_target(target);
    BatchPlan {
        batch_size,
        per_keyword_target: per_keyword_target(target, keywords.len()),
        batches: keywords
            .chunks(batch_size)
            .map(<[String]>::to_vec)
            .collect(),
    }
}

/// Timing knobs for the fan-out.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub stagger_ms: u64,
    pub delay_start_ms: u64,
    pub delay_floor_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            stagger_ms: 150,
            delay_start_ms: 2_000,
            delay_floor_ms: 500,
        }
    }
}

impl BatchSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            stagger_ms: config.batch_stagger_ms,
            delay_start_ms: config.batch_delay_start_ms,
            delay_floor_ms: config.batch_delay_floor_ms,
        }
    }
}

/// Inter-batch delay that grows with observed failures and shrinks when
/// batches come back fast and clean.
#[derive(Debug)]
pub struct AdaptiveDelay {
    current_ms: u64,
    floor_ms: u64,
    ceiling_ms: u64,
}

impl AdaptiveDelay {
    #[must_use]
    pub fn new(settings: &BatchSettings) -> Self {
        let start = settings.delay_start_ms.max(settings.delay_floor_ms);
        Self {
            current_ms: start,
            floor_ms: settings.delay_floor_ms,
            ceiling_ms: start.saturating_mul(MAX_DELAY_GROWTH),
        }
    }

    /// Folds one batch's result into the delay and returns the wait before
    /// the next batch.
    pub fn observe(&mut self, failed_keywords: usize, batch_elapsed: Duration) -> Duration {
        if failed_keywords > 0 {
            let growth = u64::try_from(failed_keywords).unwrap_or(u64::MAX).saturating_add(1);
            self.current_ms = self.current_ms.saturating_mul(growth).min(self.ceiling_ms);
        } else if batch_elapsed < FAST_BATCH {
            self.current_ms = (self.current_ms / 2).max(self.floor_ms);
        }
        Duration::from_millis(self.current_ms)
    }
}

/// Runs one batch of keywords concurrently with staggered starts, returning
/// outcomes in keyword order.
pub async fn run_batch<F, Fut>(
    keywords: &[String],
    stagger: Duration,
    search: F,
) -> Vec<KeywordOutcome>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = KeywordOutcome>,
{
    let staggered = keywords.iter().enumerate().map(|(index, keyword)| {
        let fut = search(keyword.clone());
        let offset = stagger * u32::try_from(index).unwrap_or(u32::MAX);
        async move {
            if !offset.is_zero() {
                tokio::time::sleep(offset).await;
            }
            fut.await
        }
    });
    futures::future::join_all(staggered).await
}
