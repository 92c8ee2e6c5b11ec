//! HTTP handlers for campaign redirects, view callbacks and operational endpoints.

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, RawQuery, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use campaign_analytics::AnalyticsRecorder;
use campaign_core::dispatch::{build_redirect_url, dispatch, DispatchOutcome, INTOID_PARAM};
use campaign_store::CampaignStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

/// Body returned for unknown campaigns and campaigns with nothing to serve.
/// Sent with 200 so crawlers cannot tell which keys exist.
pub const NOT_FOUND_MESSAGE: &str = "Campaign not found";

/// Body acknowledging a view callback.
pub const VIEW_ACK_MESSAGE: &str = "OK";

const TRACKING_SCRIPT_TEMPLATE: &str = include_str!("../assets/tracking.js");
const APP_URL_PLACEHOLDER: &str = "{{APP_URL}}";

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CampaignStore>,
    pub analytics: Arc<AnalyticsRecorder>,
    pub tracking_script: Arc<str>,
    pub node_id: String,
    pub start_time: Instant,
}

/// Render the tracking script with the public base URL filled in.
pub fn render_tracking_script(base_url: &str) -> String {
    TRACKING_SCRIPT_TEMPLATE.replace(APP_URL_PLACEHOLDER, base_url.trim_end_matches('/'))
}

fn parse_pairs(raw: &[u8]) -> Vec<(String, String)> {
    form_urlencoded::parse(raw).into_owned().collect()
}

fn campaign_not_found() -> Response {
    (StatusCode::OK, NOT_FOUND_MESSAGE).into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
}

/// GET /:key — dispatch a page of the campaign and redirect to it.
pub async fn redirect(
    State(state): State<AppState>,
    Path(key): Path<String>,
    OriginalUri(uri): OriginalUri,
    RawQuery(query): RawQuery,
) -> Response {
    metrics::counter!("redirect.requests").increment(1);
    let pairs = parse_pairs(query.as_deref().unwrap_or_default().as_bytes());

    let campaign = match state.store.load(&key).await {
        Ok(Some(campaign)) => campaign,
        Ok(None) => {
            info!(key = %key, "Campaign not found");
            metrics::counter!("redirect.not_found").increment(1);
            return campaign_not_found();
        }
        Err(e) => {
            error!(error = %e, key = %key, "Failed to load campaign");
            metrics::counter!("redirect.load_errors").increment(1);
            return campaign_not_found();
        }
    };

    let outcome = match dispatch(&campaign) {
        DispatchOutcome::Dispatched(outcome) => outcome,
        DispatchOutcome::NoDestination { campaign } => {
            warn!(
                key = %key,
                pages = campaign.pages.len(),
                cycles_done = campaign.cycles_done,
                "No eligible page after cycle reset"
            );
            metrics::counter!("redirect.no_eligible_page").increment(1);
            if let Err(e) = state.store.save(&campaign).await {
                error!(error = %e, key = %key, "Failed to persist campaign state");
                metrics::counter!("redirect.persistence_failures").increment(1);
                return internal_error();
            }
            return campaign_not_found();
        }
    };

    // Validate the target before any state is written or any hit is counted.
    let target = build_redirect_url(&outcome.page, &pairs);
    let location = match HeaderValue::from_str(&target) {
        Ok(location) => location,
        Err(e) => {
            error!(
                error = %e,
                key = %key,
                page_id = outcome.page.id,
                "Redirect target is not a valid header value"
            );
            metrics::counter!("redirect.invalid_targets").increment(1);
            return internal_error();
        }
    };

    if outcome.cycle_reset {
        metrics::counter!("dispatch.cycle_resets").increment(1);
        info!(
            key = %key,
            cycles_done = outcome.campaign.cycles_done,
            "Campaign cycle reset"
        );
    }

    if let Err(e) = state.store.save(&outcome.campaign).await {
        error!(
            error = %e,
            key = %key,
            page_id = outcome.page.id,
            "Failed to persist campaign state"
        );
        metrics::counter!("redirect.persistence_failures").increment(1);
        return internal_error();
    }

    state.analytics.record_hit(outcome.page.id, &pairs).await;

    metrics::counter!("redirect.dispatched").increment(1);
    info!(
        key = %key,
        page_id = outcome.page.id,
        input = %uri,
        output = %target,
        "Redirecting"
    );

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// POST /hooks/campaign/view — landing page confirms it was displayed.
///
/// Reads form fields from the body, then the query string. Requests without
/// a usable `intoid` are acknowledged without recording anything.
pub async fn view(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let mut pairs = parse_pairs(&body);
    pairs.extend(parse_pairs(query.as_deref().unwrap_or_default().as_bytes()));

    let intoid = pairs
        .iter()
        .find(|(name, _)| name == INTOID_PARAM)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty());

    match intoid.map(|raw| (raw, raw.parse::<i64>())) {
        None => {
            debug!("View callback without intoid ignored");
        }
        Some((_, Ok(page_id))) => {
            state.analytics.record_view(page_id, &pairs).await;
        }
        Some((raw, Err(e))) => {
            warn!(error = %e, intoid = raw, "View callback with invalid intoid ignored");
            metrics::counter!("view.invalid_intoid").increment(1);
        }
    }

    (StatusCode::OK, VIEW_ACK_MESSAGE).into_response()
}

/// GET /tracking.js — client-side view tracking script.
pub async fn tracking_script(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        state.tracking_script.to_string(),
    )
}

/// GET / — Service status.
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "OK".to_string(),
    })
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness check. 200 only while the campaign store answers.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store.ping().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live — Liveness check for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(rename = "Status")]
    pub status: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
