//! Job processing engine: keyword expansion, batched fan-out against the
//! discovery API, fan-in aggregation, and lifecycle finalization.

pub mod aggregate;
pub mod analytics;
pub mod batch;
pub mod cache;
pub mod error;
pub mod expansion;
pub mod pipeline;
pub mod quota;
pub mod retry;

pub use aggregate::{aggregate, efficiency, Aggregation};
pub use analytics::{AnalyticsEvent, AnalyticsQueue, AnalyticsSink, TracingSink};
pub use batch::{
    batch_size_for_target, per_keyword_target, plan_batches, run_batch, AdaptiveDelay, BatchPlan,
    BatchSettings,
};
pub use cache::{MemoryTtlCache, TtlCache};
pub use error::{BuildError, EngineError};
pub use expansion::{
    ExpansionEngine, ExpansionError, GenerationClient, KeywordGroups, KeywordModel,
};
pub use pipeline::Engine;
pub use quota::{AllowAllQuota, FixedLimitQuota, QuotaDecision, QuotaGate};
pub use retry::{search_with_retry, KeywordOutcome, RetryPolicy};
