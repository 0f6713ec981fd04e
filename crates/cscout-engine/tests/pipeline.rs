//! End-to-end pipeline tests: a real Postgres schema via `sqlx::test` plus
//! wiremock stand-ins for the discovery and generation APIs.
//!
//! The generation mock always fails, so every job runs on the deterministic
//! fallback strategy — five keywords derived from the seed — which keeps
//! batch counts predictable without caring about model output.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cscout_core::{JobMetadata, JobStatus};
use cscout_db::{self as db, NewSearchJob};
use cscout_discovery::{DiscoveryClient, HandlerRegistry};
use cscout_engine::{
    AnalyticsQueue, BatchSettings, Engine, ExpansionEngine, GenerationClient, MemoryTtlCache,
    RetryPolicy, TracingSink,
};

/// Number of working keywords a single-seed job runs on when expansion
/// falls back: the seed plus its four deterministic variants.
const FALLBACK_KEYWORDS: u64 = 5;

fn test_engine(pool: PgPool, discovery_url: &str, generation_url: &str) -> Engine {
    let ttl = Duration::from_secs(300);
    Engine {
        pool,
        discovery: Arc::new(
            DiscoveryClient::with_base_url(None, 5, discovery_url).expect("discovery client"),
        ),
        registry: Arc::new(HandlerRegistry::with_defaults()),
        expansion: ExpansionEngine::new(
            Arc::new(
                GenerationClient::with_base_url(None, "test-model", 5, generation_url)
                    .expect("generation client"),
            ),
            Arc::new(MemoryTtlCache::new(ttl, ttl)),
        ),
        result_cache: Arc::new(MemoryTtlCache::new(ttl, ttl)),
        retry: RetryPolicy {
            max_attempts: 2,
            backoff_base_ms: 0,
            backoff_cap_ms: 0,
        },
        batching: BatchSettings {
            stagger_ms: 0,
            delay_start_ms: 0,
            delay_floor_ms: 0,
        },
        analytics: AnalyticsQueue::spawn(Arc::new(TracingSink)),
    }
}

/// Generation mock that always fails, forcing the fallback strategy.
async fn broken_generation() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

fn tiktok_page(ids: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "items": ids.iter().map(|id| serde_json::json!({
            "id": id,
            "unique_id": format!("user{id}"),
            "nickname": format!("Creator {id}"),
            "follower_count": 1000,
            "verified": false
        })).collect::<Vec<_>>(),
        "has_more": false
    })
}

async fn create_job(pool: &PgPool, keywords: &[&str], target: i32, timeout_secs: i64) -> Uuid {
    let row = db::create_search_job(
        pool,
        &NewSearchJob {
            owner_id: Uuid::new_v4(),
            campaign_id: None,
            platform: "tiktok".to_owned(),
            keywords: keywords.iter().map(|s| (*s).to_owned()).collect(),
            target_results: target,
            platform_params: serde_json::json!({}),
            timeout_secs,
        },
    )
    .await
    .expect("job creation");
    row.id
}

#[sqlx::test(migrations = "../../migrations")]
async fn job_with_clean_searches_completes(pool: PgPool) {
    let discovery = MockServer::start().await;
    let generation = broken_generation().await;

    Mock::given(method("GET"))
        .and(path("/tiktok/creators/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tiktok_page(&["1", "2", "3"])))
        .mount(&discovery)
        .await;

    let engine = test_engine(pool.clone(), &discovery.uri(), &generation.uri());
    let job_id = create_job(&pool, &["coffee"], 50, 600).await;

    engine.process_job(job_id).await.expect("processing");

    let row = db::get_search_job(&pool, job_id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Completed);
    assert_eq!(row.progress, 100);
    // Every keyword returned the same three creators; dedup leaves three.
    assert_eq!(row.processed_results, 3);
    assert!(row.error_message.is_none());
    assert!(row.completed_at.is_some());

    match row.metadata().unwrap().expect("metadata") {
        JobMetadata::KeywordSearch {
            strategy,
            batching,
            efficiency,
        } => {
            assert_eq!(strategy.seed, "coffee");
            assert_eq!(batching.batch_size, 4);
            assert_eq!(batching.failed_keywords, 0);
            assert_eq!(batching.total_api_calls, FALLBACK_KEYWORDS);
            assert_eq!(batching.keyword_yields.len(), 5);
            assert!(efficiency > 0.0);
        }
        JobMetadata::SimilaritySearch { .. } => panic!("unexpected metadata kind"),
    }

    let snapshot = db::get_search_result(&pool, job_id)
        .await
        .unwrap()
        .expect("snapshot");
    assert_eq!(snapshot.creators().unwrap().len(), 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_keyword_yields_partial(pool: PgPool) {
    let discovery = MockServer::start().await;
    let generation = broken_generation().await;

    // The specific mock is mounted first so it wins over the catch-all.
    Mock::given(method("GET"))
        .and(path("/tiktok/creators/search"))
        .and(query_param("q", "coffee content"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&discovery)
        .await;
    Mock::given(method("GET"))
        .and(path("/tiktok/creators/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tiktok_page(&["1", "2"])))
        .mount(&discovery)
        .await;

    let engine = test_engine(pool.clone(), &discovery.uri(), &generation.uri());
    let job_id = create_job(&pool, &["coffee"], 50, 600).await;

    engine.process_job(job_id).await.expect("processing");

    let row = db::get_search_job(&pool, job_id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Partial);
    assert_eq!(row.processed_results, 2);

    match row.metadata().unwrap().expect("metadata") {
        JobMetadata::KeywordSearch { batching, .. } => {
            assert_eq!(batching.failed_keywords, 1);
            let failed = batching
                .keyword_yields
                .iter()
                .find(|y| y.keyword == "coffee content")
                .expect("failed keyword yield");
            assert_eq!(failed.fetched, 0);
        }
        JobMetadata::SimilaritySearch { .. } => panic!("unexpected metadata kind"),
    }

    // Partial still writes a snapshot.
    assert!(db::get_search_result(&pool, job_id).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn clean_empty_searches_complete_with_empty_snapshot(pool: PgPool) {
    let discovery = MockServer::start().await;
    let generation = broken_generation().await;

    // Every search succeeds but nobody matches.
    Mock::given(method("GET"))
        .and(path("/tiktok/creators/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tiktok_page(&[])))
        .mount(&discovery)
        .await;

    let engine = test_engine(pool.clone(), &discovery.uri(), &generation.uri());
    let job_id = create_job(&pool, &["coffee"], 50, 600).await;

    engine.process_job(job_id).await.expect("processing");

    let row = db::get_search_job(&pool, job_id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Completed);
    assert_eq!(row.processed_results, 0);
    assert!(row.error_message.is_none());

    let snapshot = db::get_search_result(&pool, job_id)
        .await
        .unwrap()
        .expect("empty runs still snapshot");
    assert!(snapshot.creators().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn all_failures_yield_error_without_snapshot(pool: PgPool) {
    let discovery = MockServer::start().await;
    let generation = broken_generation().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&discovery)
        .await;

    let engine = test_engine(pool.clone(), &discovery.uri(), &generation.uri());
    let job_id = create_job(&pool, &["coffee"], 50, 600).await;

    engine.process_job(job_id).await.expect("processing");

    let row = db::get_search_job(&pool, job_id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Error);
    assert_eq!(
        row.error_message.as_deref(),
        Some("all keyword searches failed")
    );
    assert!(db::get_search_result(&pool, job_id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn overdue_job_times_out_before_any_search(pool: PgPool) {
    let discovery = MockServer::start().await;
    let generation = broken_generation().await;

    let engine = test_engine(pool.clone(), &discovery.uri(), &generation.uri());
    let job_id = create_job(&pool, &["coffee"], 50, 0).await;

    engine.process_job(job_id).await.expect("processing");

    let row = db::get_search_job(&pool, job_id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Timeout);
    assert!(row.started_at.is_none());
    assert!(db::get_search_result(&pool, job_id).await.unwrap().is_none());
    // No quota was burned on a dead job.
    assert!(discovery.received_requests().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn redelivered_trigger_is_a_no_op(pool: PgPool) {
    let discovery = MockServer::start().await;
    let generation = broken_generation().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tiktok_page(&["1"])))
        .mount(&discovery)
        .await;

    let engine = test_engine(pool.clone(), &discovery.uri(), &generation.uri());
    let job_id = create_job(&pool, &["coffee"], 50, 600).await;

    engine.process_job(job_id).await.expect("first delivery");
    let first = db::get_search_job(&pool, job_id).await.unwrap();
    assert_eq!(first.status().unwrap(), JobStatus::Completed);
    let calls_after_first = discovery.received_requests().await.unwrap().len();

    engine.process_job(job_id).await.expect("second delivery");
    let second = db::get_search_job(&pool, job_id).await.unwrap();
    assert_eq!(second.status().unwrap(), JobStatus::Completed);
    assert_eq!(second.completed_at, first.completed_at);
    // The redelivery short-circuited before touching the API.
    assert_eq!(
        discovery.received_requests().await.unwrap().len(),
        calls_after_first
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn already_claimed_job_is_left_alone(pool: PgPool) {
    let discovery = MockServer::start().await;
    let generation = broken_generation().await;

    let engine = test_engine(pool.clone(), &discovery.uri(), &generation.uri());
    let job_id = create_job(&pool, &["coffee"], 50, 600).await;
    db::start_search_job(&pool, job_id).await.unwrap();

    engine.process_job(job_id).await.expect("processing");

    let row = db::get_search_job(&pool, job_id).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Processing);
    assert!(discovery.received_requests().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn result_cache_spares_repeat_searches(pool: PgPool) {
    let discovery = MockServer::start().await;
    let generation = broken_generation().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tiktok_page(&["1", "2"])))
        .mount(&discovery)
        .await;

    let engine = test_engine(pool.clone(), &discovery.uri(), &generation.uri());

    let first = create_job(&pool, &["coffee"], 50, 600).await;
    engine.process_job(first).await.expect("first job");
    let calls_after_first = discovery.received_requests().await.unwrap().len();
    assert_eq!(calls_after_first as u64, FALLBACK_KEYWORDS);

    // Same seed, same target tier: every keyword hits the result cache.
    let second = create_job(&pool, &["coffee"], 50, 600).await;
    engine.process_job(second).await.expect("second job");
    assert_eq!(
        discovery.received_requests().await.unwrap().len(),
        calls_after_first
    );

    let row = db::get_search_job(&pool, second).await.unwrap();
    assert_eq!(row.status().unwrap(), JobStatus::Completed);
    assert_eq!(row.processed_results, 2);
}
