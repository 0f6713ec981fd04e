//! Quota enforcement seam.
//!
//! Job creation asks a [`QuotaGate`] whether the owner may run a search of
//! the requested volume before any row is written. The gate is a trait so
//! deployments can plug in a billing-backed implementation; the defaults
//! here are an allow-all gate and a fixed per-job clamp.

use async_trait::async_trait;
use uuid::Uuid;

/// Verdict on one prospective search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Human-readable denial reason, surfaced verbatim to the caller.
    pub reason: Option<String>,
    /// When set, the job runs with this target instead of the requested one.
    pub adjusted_limit: Option<i64>,
}

impl QuotaDecision {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            adjusted_limit: None,
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            adjusted_limit: None,
        }
    }

    #[must_use]
    pub fn clamp(limit: i64) -> Self {
        Self {
            allowed: true,
            reason: None,
            adjusted_limit: Some(limit),
        }
    }
}

#[async_trait]
pub trait QuotaGate: Send + Sync {
    async fn check(&self, owner_id: Uuid, requested: i64, search_type: &str) -> QuotaDecision;
}

/// Gate that admits everything. The default when no quota backend is wired.
pub struct AllowAllQuota;

#[async_trait]
impl QuotaGate for AllowAllQuota {
    async fn check(&self, _owner_id: Uuid, _requested: i64, _search_type: &str) -> QuotaDecision {
        QuotaDecision::allow()
    }
}

/// Gate that clamps every job to a fixed per-job ceiling.
pub struct FixedLimitQuota {
    pub max_results_per_job: i64,
}

#[async_trait]
impl QuotaGate for FixedLimitQuota {
    async fn check(&self, _owner_id: Uuid, requested: i64, _search_type: &str) -> QuotaDecision {
        if requested > self.max_results_per_job {
            QuotaDecision::clamp(self.max_results_per_job)
        } else {
            QuotaDecision::allow()
        }
    }
}
