use crate::bandwidth::BandwidthMonitor;
use crate::cache::{start_sweep_task, ResolutionCache};
use crate::config::Config;
use crate::jobs::JobManager;
use crate::resolver::cloud::{CloudBackend, HttpCloudBackend};
use crate::resolver::local_index::{DirectoryIndex, LocalIndex};
use crate::resolver::{ResolverSettings, SourceResolver};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use reelhunt_db::pool::init_pool;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub mod error;
pub mod routes_bandwidth;
pub mod routes_fallback;
pub mod routes_jobs;
pub mod routes_resolve;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub resolver: SourceResolver,
    pub bandwidth: BandwidthMonitor,
}

impl AppContext {
    pub fn new(config: Config, resolver: SourceResolver, bandwidth: BandwidthMonitor) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            bandwidth,
        }
    }

    /// Wire up the production services described by `config`.
    ///
    /// A database that cannot be opened leaves the cache unavailable rather
    /// than failing startup.
    pub fn from_config(config: Config) -> Result<Self> {
        let ttl = Duration::from_secs(config.cache.ttl_hours * 3600);
        let db_path = data_dir(&config).join("reelhunt.db");
        tracing::info!("Initializing database at {}", db_path.display());
        let cache = match init_pool(&db_path) {
            Ok(pool) => ResolutionCache::new(pool, ttl),
            Err(e) => {
                tracing::warn!(
                    "Resolution cache disabled, failed to open {}: {}",
                    db_path.display(),
                    e
                );
                ResolutionCache::unavailable(ttl)
            }
        };

        let jobs = JobManager::new(Duration::from_secs(config.jobs.max_age_secs));

        let local: Arc<dyn LocalIndex> = Arc::new(
            DirectoryIndex::new(config.local_index.libraries.clone(), &config.server.public_url)
                .context("Invalid local index configuration")?,
        );

        let cloud: Option<Arc<dyn CloudBackend>> = if config.cloud.enabled {
            tracing::info!("Cloud backend enabled at {}", config.cloud.base_url);
            Some(Arc::new(HttpCloudBackend::new(
                &config.cloud.base_url,
                &config.cloud.api_key,
                config.cloud.request_timeout(),
            )))
        } else {
            None
        };

        let settings = ResolverSettings::from_config(&config);
        let resolver = SourceResolver::new(cache, jobs, local, cloud, settings);
        let bandwidth = BandwidthMonitor::new(config.bandwidth.clone());
        Ok(Self::new(config, resolver, bandwidth))
    }
}

fn data_dir(config: &Config) -> PathBuf {
    config
        .server
        .data_dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-user-id"),
        ]);

    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes());

    // Local library files back the stream URLs handed out by the local index
    for library in &ctx.config.local_index.libraries {
        tracing::info!(library = %library.name, path = %library.path.display(), "Serving library");
        app = app.nest_service(&format!("/media/{}", library.name), ServeDir::new(&library.path));
    }

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn api_routes() -> Router<AppContext> {
    routes_resolve::resolve_routes()
        .merge(routes_jobs::job_routes())
        .merge(routes_bandwidth::bandwidth_routes())
        .merge(routes_fallback::fallback_routes())
}

async fn health_check(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "cloudEnabled": ctx.resolver.cloud_enabled(),
        "activeJobs": ctx.resolver.jobs().len(),
    }))
}

/// Run the server and its background tasks until a shutdown signal arrives
/// or `shutdown` is cancelled.
pub async fn start_server(ctx: AppContext, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("Starting server on {}", addr);

    serve(listener, ctx, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    ctx: AppContext,
    shutdown: CancellationToken,
) -> Result<()> {
    let sweeper = start_sweep_task(
        ctx.resolver.cache().clone(),
        Duration::from_secs(ctx.config.cache.sweep_interval_secs),
        shutdown.clone(),
    );
    let jobs = ctx.resolver.jobs().clone();
    let reaper = jobs.start_reaper(Duration::from_secs(ctx.config.jobs.reap_interval_secs));

    let app = create_router(ctx);
    let signal_token = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {},
                _ = signal_token.cancelled() => {},
            }
        })
        .await;

    // Signal all background tasks to stop.
    shutdown.cancel();
    jobs.shutdown();
    let _ = tokio::join!(sweeper, reaper);

    tracing::info!("Server shutdown complete");
    result.context("Server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
