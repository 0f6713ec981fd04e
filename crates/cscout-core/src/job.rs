//! Job-level vocabulary shared across crates: status machine states, the
//! fixed result-count tiers, and the typed metadata blob.

use serde::{Deserialize, Serialize};

use crate::strategy::KeywordStrategy;

/// Lifecycle states of a search job.
///
/// `Pending → Processing → {Completed, Partial, Error, Timeout}`. The four
/// right-hand states are terminal sinks; every DB transition statement
/// guards on the expected prior status so no write can leave a terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Error,
    Timeout,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Error | JobStatus::Timeout
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Error => "error",
            JobStatus::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "partial" => Ok(JobStatus::Partial),
            "error" => Ok(JobStatus::Error),
            "timeout" => Ok(JobStatus::Timeout),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of requestable result-count tiers.
///
/// Job creation rejects any count outside this set; quota enforcement may
/// still clamp the effective target below the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetTier {
    Fifty,
    Hundred,
    TwoFifty,
    FiveHundred,
}

impl TargetTier {
    /// Maps a raw requested count onto a tier, rejecting unrecognized values.
    pub fn from_count(count: i64) -> Result<Self, String> {
        match count {
            50 => Ok(TargetTier::Fifty),
            100 => Ok(TargetTier::Hundred),
            250 => Ok(TargetTier::TwoFifty),
            500 => Ok(TargetTier::FiveHundred),
            other => Err(format!(
                "unrecognized target tier {other}; expected one of 50, 100, 250, 500"
            )),
        }
    }

    #[must_use]
    pub fn count(self) -> i64 {
        match self {
            TargetTier::Fifty => 50,
            TargetTier::Hundred => 100,
            TargetTier::TwoFifty => 250,
            TargetTier::FiveHundred => 500,
        }
    }
}

/// Aggregate counters describing how a job's batched fan-out went.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchingStats {
    pub batch_size: usize,
    pub batch_count: usize,
    pub total_api_calls: u64,
    pub failed_keywords: usize,
    pub duplicates_removed: usize,
    /// Unique creators each keyword contributed, in keyword order.
    pub keyword_yields: Vec<KeywordYield>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordYield {
    pub keyword: String,
    pub unique: usize,
    pub fetched: usize,
}

/// Typed job metadata, tagged by job kind.
///
/// Stored as one `jsonb` column and decoded exactly once at the lifecycle
/// boundary — readers get a typed union instead of re-parsing an ad-hoc
/// blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobMetadata {
    KeywordSearch {
        strategy: KeywordStrategy,
        batching: BatchingStats,
        /// `final unique count / total API calls`; 0.0 when no calls were made.
        efficiency: f64,
    },
    SimilaritySearch {
        seed_handle: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Partial.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Partial,
            JobStatus::Error,
            JobStatus::Timeout,
        ] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
    }

    #[test]
    fn tier_accepts_only_fixed_counts() {
        assert_eq!(TargetTier::from_count(100).unwrap(), TargetTier::Hundred);
        assert!(TargetTier::from_count(99).is_err());
        assert!(TargetTier::from_count(0).is_err());
        assert!(TargetTier::from_count(1000).is_err());
    }

    #[test]
    fn metadata_round_trips_with_kind_tag() {
        let meta = JobMetadata::KeywordSearch {
            strategy: KeywordStrategy::fallback("coffee"),
            batching: BatchingStats::default(),
            efficiency: 0.8,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["kind"], "keyword_search");

        let back: JobMetadata = serde_json::from_value(json).unwrap();
        assert!(matches!(back, JobMetadata::KeywordSearch { .. }));
    }

    #[test]
    fn similarity_metadata_is_distinguishable() {
        let json = serde_json::json!({ "kind": "similarity_search", "seed_handle": "@abc" });
        let meta: JobMetadata = serde_json::from_value(json).unwrap();
        assert!(matches!(meta, JobMetadata::SimilaritySearch { seed_handle } if seed_handle == "@abc"));
    }
}
