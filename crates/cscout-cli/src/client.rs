//! Thin HTTP client for the cscout-server API.
//!
//! Deserializes only the fields the CLI prints; everything else in the
//! response envelope is ignored so server-side additions never break the
//! tool.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use cscout_core::JobStatus;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatedJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub effective_target: i32,
}

#[derive(Debug, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: i32,
    pub platform: String,
    pub target_results: i32,
    pub processed_results: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Option<ResultsPage>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsPage {
    pub total: usize,
    pub offset: usize,
    pub creators: Vec<CreatorLine>,
}

#[derive(Debug, Deserialize)]
pub struct CreatorLine {
    pub username: String,
    pub follower_count: i64,
    pub verified: bool,
    pub source_keyword: String,
}

#[derive(Debug, Deserialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: i32,
    pub platform: String,
    pub processed_results: i32,
    pub created_at: DateTime<Utc>,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.map(ToOwned::to_owned),
        })
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success API response.
    pub async fn create_job(
        &self,
        owner_id: Uuid,
        campaign_id: Option<Uuid>,
        platform: &str,
        keywords: &[String],
        target_results: i64,
    ) -> anyhow::Result<CreatedJob> {
        let request = self
            .http
            .post(format!("{}/api/v1/jobs", self.base_url))
            .json(&serde_json::json!({
                "owner_id": owner_id,
                "campaign_id": campaign_id,
                "platform": platform,
                "keywords": keywords,
                "target_results": target_results,
            }));
        self.send(request).await
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success API response.
    pub async fn job_status(
        &self,
        job_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<JobReport> {
        let request = self.http.get(format!(
            "{}/api/v1/jobs/{job_id}?offset={offset}&limit={limit}",
            self.base_url
        ));
        self.send(request).await
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success API response.
    pub async fn list_jobs(&self, owner_id: Uuid) -> anyhow::Result<Vec<JobSummary>> {
        let request = self.http.get(format!(
            "{}/api/v1/jobs?owner_id={owner_id}",
            self.base_url
        ));
        self.send(request).await
    }

    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success API response.
    pub async fn trigger_job(&self, job_id: Uuid) -> anyhow::Result<()> {
        let request = self
            .http
            .post(format!("{}/api/v1/jobs/{job_id}/process", self.base_url));
        let _: serde_json::Value = self.send(request).await?;
        Ok(())
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> anyhow::Result<T> {
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.context("request failed")?;
        let status = response.status();
        let body = response.bytes().await.context("failed to read response")?;

        if !status.is_success() {
            // Prefer the API's own error message when the body parses.
            if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&body) {
                anyhow::bail!(
                    "{} ({}): {}",
                    envelope.error.code,
                    status,
                    envelope.error.message
                );
            }
            anyhow::bail!("request failed with status {status}");
        }

        let envelope: Envelope<T> =
            serde_json::from_slice(&body).context("unexpected response shape")?;
        Ok(envelope.data)
    }
}
