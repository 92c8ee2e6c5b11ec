//! Campaign state store seam shared by the Redis and in-memory adapters.

use async_trait::async_trait;
use campaign_core::types::{AnalyticsEvent, Campaign};
use campaign_core::CampaignResult;

/// Prefix of every campaign record key.
pub const CAMPAIGN_KEY_PREFIX: &str = "campaign:";

/// Store key for the campaign with lookup key `key`.
pub fn campaign_record_key(key: &str) -> String {
    format!("{CAMPAIGN_KEY_PREFIX}{key}")
}

/// Read/modify/write access to campaign records plus the analytics queue.
///
/// `save` is an unconditional overwrite. Two requests racing on the same
/// campaign may both load the same snapshot and the later write wins,
/// dropping the other request's quota increment. Quotas only shape traffic,
/// so that loss is accepted in exchange for lock-free request handling. A
/// version-checked write would belong here, not in the dispatch engine.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Fetch the campaign stored under `campaign:<key>`. `Ok(None)` when absent.
    async fn load(&self, key: &str) -> CampaignResult<Option<Campaign>>;

    /// Overwrite the record at `campaign:<campaign.key>`.
    async fn save(&self, campaign: &Campaign) -> CampaignResult<()>;

    /// Append an event to the analytics work queue.
    async fn enqueue_analytics(&self, event: &AnalyticsEvent) -> CampaignResult<()>;

    /// Check that the backing store is reachable. Reads no campaign record.
    async fn ping(&self) -> CampaignResult<()>;
}
