mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use cscout_engine::{AllowAllQuota, AnalyticsQueue, Engine, TracingSink};

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = cscout_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = cscout_db::PoolConfig::from_app_config(&config);
    let pool = cscout_db::connect_pool(&config.database_url, pool_config).await?;
    cscout_db::run_migrations(&pool).await?;

    let analytics = AnalyticsQueue::spawn(Arc::new(TracingSink));
    let engine = Arc::new(Engine::from_app_config(&config, pool.clone(), analytics)?);

    let _scheduler = scheduler::build_scheduler(Arc::clone(&engine)).await?;

    let auth = AuthState::from_config(&config)?;
    let app = build_app(
        AppState {
            pool,
            engine,
            quota: Arc::new(AllowAllQuota),
            job_timeout_secs: i64::try_from(config.job_timeout_secs).unwrap_or(i64::MAX),
        },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "cscout-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
