//! API server — builds the router and runs the HTTP and metrics listeners.

use crate::rest::{self, render_tracking_script, AppState};
use axum::routing::{get, post};
use axum::Router;
use campaign_analytics::AnalyticsRecorder;
use campaign_core::config::AppConfig;
use campaign_store::CampaignStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Assemble all routes with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Client-side view callback and its script
        .route("/hooks/campaign/view", post(rest::view))
        .route("/tracking.js", get(rest::tracking_script))
        // Operational endpoints
        .route("/", get(rest::root))
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Campaign redirect
        .route("/:key", get(rest::redirect))
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server serving campaign redirects.
pub struct ApiServer {
    config: AppConfig,
    store: Arc<dyn CampaignStore>,
}

impl ApiServer {
    pub fn new(config: AppConfig, store: Arc<dyn CampaignStore>) -> Self {
        Self { config, store }
    }

    fn state(&self) -> AppState {
        AppState {
            store: self.store.clone(),
            analytics: Arc::new(AnalyticsRecorder::new(
                self.store.clone(),
                &self.config.analytics,
            )),
            tracking_script: render_tracking_script(&self.config.public.base_url).into(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        }
    }

    /// Start the HTTP server. Runs until the listener fails.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = build_router(self.state());

        let addr = SocketAddr::new(
            self.config.api.host.parse()?,
            self.config.api.http_port,
        );

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
