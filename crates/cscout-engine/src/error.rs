use thiserror::Error;

use crate::expansion::ExpansionError;
use cscout_discovery::DiscoveryError;

/// Failures the pipeline cannot absorb into the job record itself.
///
/// Keyword-level and expansion failures never surface here — they are folded
/// into the job's terminal status and metadata. What remains is loss of the
/// persistence layer, where the correct move is to leave the row alone and
/// let the timeout sweep reconcile it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Db(#[from] cscout_db::DbError),
}

/// Failures wiring the engine's HTTP clients at startup.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
}
