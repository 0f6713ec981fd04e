//! Fire-and-forget analytics.
//!
//! Events go onto a bounded channel; a background worker drains it into an
//! [`AnalyticsSink`]. A slow or failing sink never blocks or fails the
//! pipeline: a full channel drops the event, a publish error is logged and
//! the worker moves on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

const QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    JobCreated {
        job_id: Uuid,
        owner_id: Uuid,
        platform: String,
        target_results: i64,
    },
    JobFinished {
        job_id: Uuid,
        status: String,
        unique_creators: usize,
        api_calls: u64,
        efficiency: f64,
    },
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn publish(&self, event: &AnalyticsEvent) -> Result<(), String>;
}

/// Sink that emits events as structured log lines.
pub struct TracingSink;

#[async_trait]
impl AnalyticsSink for TracingSink {
    async fn publish(&self, event: &AnalyticsEvent) -> Result<(), String> {
        match serde_json::to_string(event) {
            Ok(payload) => {
                tracing::info!(target: "cscout::analytics", %payload, "analytics event");
                Ok(())
            }
            Err(e) => Err(format!("event encode: {e}")),
        }
    }
}

/// Handle for enqueuing events. Cheap to clone.
#[derive(Clone)]
pub struct AnalyticsQueue {
    tx: mpsc::Sender<AnalyticsEvent>,
}

impl AnalyticsQueue {
    /// Spawns the drain worker and returns the enqueue handle. The worker
    /// exits once every handle is dropped and the queue runs dry.
    #[must_use]
    pub fn spawn(sink: Arc<dyn AnalyticsSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<AnalyticsEvent>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(error) = sink.publish(&event).await {
                    tracing::warn!(%error, "analytics publish failed; event dropped");
                }
            }
        });
        Self { tx }
    }

    /// Enqueues an event without waiting. Drops the event if the queue is
    /// full.
    pub fn record(&self, event: AnalyticsEvent) {
        if self.tx.try_send(event).is_err() {
            tracing::debug!("analytics queue full; event dropped");
        }
    }
}
