//! Web layer: the axum `Router`, `AppState`, and the handlers for every
//! route this proxy exposes — the proxy surface itself plus the
//! administrative JSON endpoints.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::proxy::ProxyPipeline;

/// Shared, cloneable state handed to every handler. `pipeline` holds the
/// cache, worker pool, and domain registry behind its own internal sharing;
/// wrapping the whole thing in one more `Arc` keeps `AppState::clone()`
/// cheap regardless of how many fields accumulate here.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ProxyPipeline>,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
    pipeline: Arc<ProxyPipeline>,
}

impl WebServer {
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let pipeline = Arc::new(ProxyPipeline::new(config.clone()));
        let state = AppState {
            pipeline: pipeline.clone(),
            config: config.clone(),
            started_at: Instant::now(),
        };

        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        let app = Self::create_router(state);

        Ok(Self { app, addr, pipeline })
    }

    /// The admin endpoints get a permissive `CorsLayer` since they're plain
    /// JSON and commonly polled from a browser-based dashboard. The proxy
    /// routes deliberately don't: an `OPTIONS` request there is a method the
    /// pipeline forwards upstream like any other, not a preflight to
    /// intercept, and `CorsLayer` would short-circuit it before it ever
    /// reached `handle()`.
    ///
    /// Exposed as `pub` so integration tests can build the same router
    /// against a hand-assembled `AppState` without binding a socket.
    pub fn create_router(state: AppState) -> Router {
        let admin = Router::new()
            .route("/status", axum::routing::get(handlers::admin::status))
            .route("/cache/stats", axum::routing::get(handlers::admin::cache_stats))
            .route("/cache/clear", axum::routing::post(handlers::admin::cache_clear))
            .route("/workers/stats", axum::routing::get(handlers::admin::worker_stats))
            .route("/metrics", axum::routing::get(handlers::admin::metrics))
            .route("/metrics/reset", axum::routing::post(handlers::admin::metrics_reset))
            .route("/debug", axum::routing::get(handlers::admin::debug_probe))
            .layer(CorsLayer::permissive());

        let proxy = Router::new()
            .route("/", axum::routing::any(handlers::proxy::root))
            .route("/base64/:encoded", axum::routing::any(handlers::proxy::base64))
            .route("/*url", axum::routing::any(handlers::proxy::inline));

        admin.merge(proxy).layer(TraceLayer::new_for_http()).with_state(state)
    }

    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        let pipeline = self.pipeline.clone();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal(pipeline))
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

async fn shutdown_signal(pipeline: Arc<ProxyPipeline>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
    pipeline.workers().shutdown();
}
