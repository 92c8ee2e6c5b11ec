//! Best-effort analytics recording: builds "hit" and "view" events and pushes
//! them onto the store's work queue. Queue failures are logged and dropped so
//! they never affect the response.

use campaign_core::config::AnalyticsConfig;
use campaign_core::types::{AnalyticsEvent, AnalyticsParam, EventType};
use campaign_store::CampaignStore;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Timestamp layout expected by the analytics consumer.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct AnalyticsRecorder {
    store: Arc<dyn CampaignStore>,
    offset: FixedOffset,
}

impl AnalyticsRecorder {
    pub fn new(store: Arc<dyn CampaignStore>, config: &AnalyticsConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| {
                warn!(
                    utc_offset_minutes = config.utc_offset_minutes,
                    "Invalid analytics UTC offset, using UTC"
                );
                Utc.fix()
            });

        Self { store, offset }
    }

    /// Record a redirect dispatch to `page_id` with the request's query pairs.
    pub async fn record_hit<K, V>(&self, page_id: i64, pairs: &[(K, V)])
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let event = self.event(page_id, EventType::Hit, pairs, Utc::now());
        self.enqueue(&event).await;
    }

    /// Record a client-side view confirmation for `page_id`.
    pub async fn record_view<K, V>(&self, page_id: i64, pairs: &[(K, V)])
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let event = self.event(page_id, EventType::View, pairs, Utc::now());
        self.enqueue(&event).await;
    }

    /// Build an event stamped at `at` in the configured offset.
    pub fn event<K, V>(
        &self,
        page_id: i64,
        event_type: EventType,
        pairs: &[(K, V)],
        at: DateTime<Utc>,
    ) -> AnalyticsEvent
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        AnalyticsEvent {
            page_id,
            date: at.with_timezone(&self.offset).format(DATE_FORMAT).to_string(),
            event_type,
            params: AnalyticsParam::from_pairs(pairs),
        }
    }

    async fn enqueue(&self, event: &AnalyticsEvent) {
        match self.store.enqueue_analytics(event).await {
            Ok(()) => {
                metrics::counter!("analytics.queued", "type" => event.event_type.as_str())
                    .increment(1);
                debug!(
                    page_id = event.page_id,
                    event_type = event.event_type.as_str(),
                    "Analytics event queued"
                );
            }
            Err(e) => {
                metrics::counter!("analytics.dropped", "type" => event.event_type.as_str())
                    .increment(1);
                warn!(
                    error = %e,
                    page_id = event.page_id,
                    event_type = event.event_type.as_str(),
                    params = event.params.len(),
                    "Analytics event dropped"
                );
            }
        }
    }
}
