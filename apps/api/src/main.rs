mod collaborators;
mod config;
mod db;
mod delivery;
mod document;
mod errors;
mod layout;
mod media;
mod models;
mod pipeline;
mod render;
mod repository;
mod routes;
mod state;
mod storage;
#[cfg(test)]
mod testing;
mod worker;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::collaborators::{ActionAgent, HttpActionAgent, HttpInterpreter, Interpreter, ServiceClient};
use crate::config::{Config, DeliveryMode, S3Config};
use crate::db::create_pool;
use crate::delivery::fax::FaxSettings;
use crate::delivery::{Deliverer, FaxDelivery, HttpFaxTransmitter, MockDelivery, RetryPolicy};
use crate::layout::{FontSet, FooterTemplate, RenderGeometry};
use crate::media::{CachedFetcher, HttpFetcher, ImageFetcher, RedisByteCache};
use crate::pipeline::{ContextRecovery, Pipeline, PipelineDeps, StageRunner};
use crate::render::Renderer;
use crate::repository::PgRepository;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::{LocalStore, ObjectStore, S3Store};
use crate::worker::RedisQueue;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        mode = config.delivery_mode.as_str(),
        "Starting Faxback API v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.job_concurrency as u32 * 2).await?;
    let repo = Arc::new(PgRepository::new(db));

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Object storage: S3 in live mode, a local outbox in mock mode
    let store: Arc<dyn ObjectStore> = match (&config.delivery_mode, &config.s3) {
        (DeliveryMode::Live, Some(s3)) => {
            let client = build_s3_client(s3).await;
            info!(bucket = %s3.bucket, "S3 client initialized");
            Arc::new(S3Store::new(client, s3.bucket.clone()))
        }
        _ => {
            info!(dir = %config.mock_outbox_dir.display(), "Using local outbox storage");
            Arc::new(LocalStore::new(config.mock_outbox_dir.clone()))
        }
    };

    // Image fetching: inbound pages uncached, document images through the Redis cache
    let inbound: Arc<dyn ImageFetcher> =
        Arc::new(HttpFetcher::new(config.image_max_bytes, config.network_timeout));
    let images: Arc<dyn ImageFetcher> = Arc::new(CachedFetcher::new(
        Arc::new(HttpFetcher::new(config.image_max_bytes, config.network_timeout)),
        Arc::new(RedisByteCache::new(redis.clone())),
        config.image_cache_ttl_secs,
    ));

    let fonts = FontSet::embedded().map_err(|e| anyhow!("embedded fonts failed to load: {e}"))?;
    let renderer = Renderer::new(
        RenderGeometry::default(),
        fonts,
        FooterTemplate::new(config.support_contact.clone()),
        images,
        config.render_workers,
    );
    info!(workers = config.render_workers, "Renderer initialized");

    // External collaborators
    let interpreter: Arc<dyn Interpreter> = Arc::new(HttpInterpreter::new(ServiceClient::new(
        config.interpreter_url.clone(),
        config.collaborator_api_key.clone(),
        config.network_timeout,
    )?));
    let agent: Arc<dyn ActionAgent> = Arc::new(HttpActionAgent::new(ServiceClient::new(
        config.agent_url.clone(),
        config.collaborator_api_key.clone(),
        config.network_timeout,
    )?));

    let deliverer: Arc<dyn Deliverer> = match (&config.delivery_mode, &config.fax_api) {
        (DeliveryMode::Live, Some(fax)) => Arc::new(FaxDelivery::new(
            store.clone(),
            Arc::new(HttpFaxTransmitter::new(
                fax.base_url.clone(),
                fax.api_key.clone(),
                config.network_timeout,
            )?),
            repo.clone(),
            FaxSettings {
                from_number: fax.from_number.clone(),
                webhook_url: fax.webhook_url.clone(),
                url_ttl: config.presigned_url_ttl,
            },
            RetryPolicy::new(config.delivery_max_attempts, config.delivery_backoff_base),
        )),
        (DeliveryMode::Live, None) => return Err(anyhow!("live delivery needs fax API settings")),
        (DeliveryMode::Mock, _) => Arc::new(MockDelivery::new(store.clone(), repo.clone())),
    };

    let pipeline = Arc::new(Pipeline::new(PipelineDeps {
        store,
        inbound,
        users: repo.clone(),
        contexts: repo.clone(),
        audit: repo.clone(),
        interpreter,
        agent,
        renderer: Arc::new(renderer),
        deliverer,
        runner: StageRunner::new(config.stage_max_attempts, config.stage_retry_delay, repo.clone()),
        recovery: ContextRecovery::new(repo.clone(), config.context_window_days),
    }));

    // Job worker
    let queue = RedisQueue::new(redis);
    tokio::spawn(worker::run(queue.clone(), pipeline, config.job_concurrency));

    // Build app state
    let state = AppState {
        config: Arc::new(config.clone()),
        queue: Arc::new(queue),
        audit: repo,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &S3Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.access_key_id,
        &config.secret_access_key,
        None,
        None,
        "faxback-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::from_conf(
        aws_sdk_s3::config::Builder::from(&s3_config)
            .force_path_style(true)
            .build(),
    )
}
