//! In-process campaign store backed by DashMap.
//! Used for local development (`--in-memory-store`) and handler tests.

use crate::store::{campaign_record_key, CampaignStore};
use async_trait::async_trait;
use campaign_core::types::{AnalyticsEvent, Campaign};
use campaign_core::{CampaignError, CampaignResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Records are kept serialized, as they would be in Redis, so every load
/// hands out a fresh snapshot.
#[derive(Default)]
pub struct InMemoryStore {
    records: DashMap<String, String>,
    queue: Mutex<VecDeque<String>>,
    fail_saves: AtomicBool,
    fail_enqueue: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the campaigns in a JSON array file.
    pub fn from_seed_file(path: impl AsRef<Path>) -> CampaignResult<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let campaigns: Vec<Campaign> = serde_json::from_str(&data)?;
        let store = Self::new();
        for campaign in &campaigns {
            store.insert(campaign)?;
        }
        info!(
            path = %path.as_ref().display(),
            campaigns = campaigns.len(),
            "In-memory store seeded"
        );
        Ok(store)
    }

    /// Write a campaign record directly, bypassing failure injection.
    pub fn insert(&self, campaign: &Campaign) -> CampaignResult<()> {
        let json = serde_json::to_string(campaign)?;
        self.records.insert(campaign_record_key(&campaign.key), json);
        Ok(())
    }

    /// Current record for `key`, if any.
    pub fn get(&self, key: &str) -> CampaignResult<Option<Campaign>> {
        match self.records.get(&campaign_record_key(key)) {
            Some(json) => Ok(Some(serde_json::from_str(json.value())?)),
            None => Ok(None),
        }
    }

    /// Store a raw record value, e.g. to simulate a corrupt entry.
    pub fn insert_raw(&self, key: &str, value: impl Into<String>) {
        self.records.insert(campaign_record_key(key), value.into());
    }

    /// Queued analytics events, oldest first.
    pub fn queued_events(&self) -> CampaignResult<Vec<AnalyticsEvent>> {
        let queue = self.queue.lock();
        queue
            .iter()
            .rev()
            .map(|json| serde_json::from_str(json).map_err(CampaignError::from))
            .collect()
    }

    /// Make subsequent `save` calls fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `enqueue_analytics` calls fail.
    pub fn fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CampaignStore for InMemoryStore {
    async fn load(&self, key: &str) -> CampaignResult<Option<Campaign>> {
        self.get(key)
    }

    async fn save(&self, campaign: &Campaign) -> CampaignResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CampaignError::Persistence(format!(
                "write to {} rejected",
                campaign_record_key(&campaign.key)
            )));
        }
        self.insert(campaign)
    }

    async fn enqueue_analytics(&self, event: &AnalyticsEvent) -> CampaignResult<()> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(CampaignError::Analytics("queue unavailable".to_string()));
        }
        let json = serde_json::to_string(event)?;
        // Mirrors LPUSH: newest at the head.
        self.queue.lock().push_front(json);
        Ok(())
    }

    async fn ping(&self) -> CampaignResult<()> {
        Ok(())
    }
}
