//! Search-job routes: creation, manual trigger, status/results, and the
//! status event stream.
//!
//! Creation is the quota boundary and the first trigger: once the row is in,
//! processing is spawned in-process and the redispatch sweep acts as the
//! at-least-once backstop. Status reads run the timeout check first, so no
//! two consecutive reads of an overdue job both claim it is still running.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use cscout_core::{Creator, JobMetadata, JobStatus, Platform, TargetTier};
use cscout_db::{self as db, DbError, NewSearchJob};
use cscout_engine::{AnalyticsEvent, Engine};

use super::{
    map_db_error, normalize_limit, normalize_offset, ApiError, ApiResponse, AppState, ResponseMeta,
};
use crate::middleware::RequestId;

const MAX_KEYWORDS: usize = 10;
const MIN_KEYWORD_CHARS: usize = 2;
const MAX_KEYWORD_CHARS: usize = 80;

/// Event-stream polls run on a fixed cadence; clients needing a different
/// page shape use the status route.
const EVENT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_RESULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub owner_id: Uuid,
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
    pub platform: String,
    pub keywords: Vec<String>,
    pub target_results: i64,
    #[serde(default)]
    pub platform_params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct JobCreatedData {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Target after quota adjustment; may be below the requested tier.
    pub effective_target: i32,
}

#[derive(Debug, Serialize)]
pub struct TriggerData {
    pub job_id: Uuid,
    pub triggered: bool,
}

#[derive(Debug, Serialize)]
pub struct JobStatusData {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: i32,
    pub platform: String,
    pub keywords: Vec<String>,
    pub target_results: i32,
    pub processed_results: i32,
    pub error_message: Option<String>,
    pub metadata: Option<JobMetadata>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Present once the job has a readable snapshot (`completed`/`partial`).
    pub results: Option<ResultsPage>,
}

#[derive(Debug, Serialize)]
pub struct ResultsPage {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub creators: Vec<Creator>,
}

#[derive(Debug, Serialize)]
pub struct JobSummaryData {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: i32,
    pub platform: String,
    pub target_results: i32,
    pub processed_results: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// POST `/api/v1/jobs`
pub async fn create_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let platform: Platform = body
        .platform
        .parse()
        .map_err(|reason: String| ApiError::new(req_id.0.clone(), "validation_error", reason))?;
    let tier = TargetTier::from_count(body.target_results)
        .map_err(|reason| ApiError::new(req_id.0.clone(), "validation_error", reason))?;
    let keywords = validate_keywords(&body.keywords)
        .map_err(|reason| ApiError::new(req_id.0.clone(), "validation_error", reason))?;

    let decision = state
        .quota
        .check(body.owner_id, tier.count(), "keyword_search")
        .await;
    if !decision.allowed {
        return Err(ApiError::new(
            req_id.0,
            "quota_exceeded",
            decision
                .reason
                .unwrap_or_else(|| "search quota exhausted".to_owned()),
        ));
    }
    let target = decision
        .adjusted_limit
        .map_or(tier.count(), |limit| limit.min(tier.count()))
        .max(1);

    let row = db::create_search_job(
        &state.pool,
        &NewSearchJob {
            owner_id: body.owner_id,
            campaign_id: body.campaign_id,
            platform: platform.as_str().to_owned(),
            keywords,
            target_results: i32::try_from(target).unwrap_or(i32::MAX),
            platform_params: body.platform_params.unwrap_or_else(|| serde_json::json!({})),
            timeout_secs: state.job_timeout_secs,
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(job_id = %row.id, %platform, target, "search job created");
    state.engine.analytics.record(AnalyticsEvent::JobCreated {
        job_id: row.id,
        owner_id: row.owner_id,
        platform: row.platform.clone(),
        target_results: i64::from(row.target_results),
    });
    spawn_processing(Arc::clone(&state.engine), row.id);

    let status = row.status().map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: JobCreatedData {
                job_id: row.id,
                status,
                effective_target: row.target_results,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// POST `/api/v1/jobs/{job_id}/process`
///
/// Manual (re-)trigger. Safe to call any number of times: the pipeline's
/// claim step turns duplicates into no-ops.
pub async fn trigger_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match db::get_search_job(&state.pool, job_id).await {
        Ok(_) => {}
        Err(DbError::NotFound) => {
            return Err(ApiError::new(req_id.0, "not_found", "search job not found"));
        }
        Err(e) => return Err(map_db_error(req_id.0, &e)),
    }

    spawn_processing(Arc::clone(&state.engine), job_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: TriggerData {
                job_id,
                triggered: true,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET `/api/v1/jobs/{job_id}?offset=&limit=`
pub async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    db::timeout_search_job_if_overdue(&state.pool, job_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let offset = normalize_offset(query.offset);
    let limit = usize::try_from(normalize_limit(query.limit)).unwrap_or(50);

    match load_status(&state.pool, job_id, offset, limit).await {
        Ok(data) => Ok(Json(ApiResponse {
            data,
            meta: ResponseMeta::new(req_id.0),
        })),
        Err(DbError::NotFound) => Err(ApiError::new(req_id.0, "not_found", "search job not found")),
        Err(e) => Err(map_db_error(req_id.0, &e)),
    }
}

/// GET `/api/v1/jobs?owner_id=&limit=`
pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(owner_id) = query.owner_id else {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "owner_id query parameter is required",
        ));
    };

    let rows = db::list_jobs_for_owner(&state.pool, owner_id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let status = row.status().map_err(|e| map_db_error(req_id.0.clone(), &e))?;
        data.push(JobSummaryData {
            job_id: row.id,
            status,
            progress: row.progress,
            platform: row.platform,
            target_results: row.target_results,
            processed_results: row.processed_results,
            created_at: row.created_at,
            completed_at: row.completed_at,
        });
    }

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET `/api/v1/jobs/{job_id}/events`
///
/// Server-sent status events: the same payload shape as the status route,
/// emitted on a fixed poll cadence and closed after the first terminal
/// payload.
pub async fn job_events(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    match db::get_search_job(&state.pool, job_id).await {
        Ok(_) => {}
        Err(DbError::NotFound) => {
            return Err(ApiError::new(req_id.0, "not_found", "search job not found"));
        }
        Err(e) => return Err(map_db_error(req_id.0, &e)),
    }

    let stream = futures::stream::unfold(
        EventStreamState {
            state,
            job_id,
            first: true,
            done: false,
        },
        |mut s| async move {
            if s.done {
                return None;
            }
            if s.first {
                s.first = false;
            } else {
                tokio::time::sleep(EVENT_POLL_INTERVAL).await;
            }

            if let Err(error) = db::timeout_search_job_if_overdue(&s.state.pool, s.job_id).await {
                tracing::warn!(job_id = %s.job_id, %error, "event stream deadline check failed");
                return None;
            }
            let payload = match load_status(&s.state.pool, s.job_id, 0, EVENT_RESULT_LIMIT).await {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::warn!(job_id = %s.job_id, %error, "event stream load failed; closing");
                    return None;
                }
            };

            s.done = payload.status.is_terminal();
            let event = Event::default().event("status").json_data(&payload).ok()?;
            Some((Ok(event), s))
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct EventStreamState {
    state: AppState,
    job_id: Uuid,
    first: bool,
    done: bool,
}

/// Builds the status payload both the status route and the event stream
/// emit. Results are attached only for snapshot-bearing states.
async fn load_status(
    pool: &PgPool,
    job_id: Uuid,
    offset: usize,
    limit: usize,
) -> Result<JobStatusData, DbError> {
    let row = db::get_search_job(pool, job_id).await?;
    let status = row.status()?;

    let results = if matches!(status, JobStatus::Completed | JobStatus::Partial) {
        match db::get_search_result(pool, job_id).await? {
            Some(snapshot) => {
                let creators = snapshot.creators()?;
                let total = creators.len();
                let page: Vec<Creator> = creators.into_iter().skip(offset).take(limit).collect();
                Some(ResultsPage {
                    total,
                    offset,
                    limit,
                    creators: page,
                })
            }
            None => None,
        }
    } else {
        None
    };

    Ok(JobStatusData {
        job_id: row.id,
        status,
        progress: row.progress,
        platform: row.platform.clone(),
        keywords: row.keywords()?,
        target_results: row.target_results,
        processed_results: row.processed_results,
        error_message: row.error_message.clone(),
        metadata: row.metadata()?,
        created_at: row.created_at,
        started_at: row.started_at,
        completed_at: row.completed_at,
        results,
    })
}

fn spawn_processing(engine: Arc<Engine>, job_id: Uuid) {
    tokio::spawn(async move {
        if let Err(error) = engine.process_job(job_id).await {
            tracing::error!(%job_id, %error, "background job processing failed");
        }
    });
}

fn validate_keywords(raw: &[String]) -> Result<Vec<String>, String> {
    let keywords: Vec<String> = raw
        .iter()
        .map(|k| k.trim().to_owned())
        .filter(|k| !k.is_empty())
        .collect();

    if keywords.is_empty() {
        return Err("at least one non-empty keyword is required".to_owned());
    }
    if keywords.len() > MAX_KEYWORDS {
        return Err(format!("at most {MAX_KEYWORDS} keywords are allowed"));
    }
    for keyword in &keywords {
        let chars = keyword.chars().count();
        if !(MIN_KEYWORD_CHARS..=MAX_KEYWORD_CHARS).contains(&chars) {
            return Err(format!(
                "keyword '{keyword}' must be between {MIN_KEYWORD_CHARS} and {MAX_KEYWORD_CHARS} characters"
            ));
        }
    }
    Ok(keywords)
}
