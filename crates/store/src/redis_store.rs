//! Redis-backed campaign store.
//! One JSON record per campaign; analytics events are LPUSHed onto a list.

use crate::store::{campaign_record_key, CampaignStore};
use async_trait::async_trait;
use campaign_core::config::{AnalyticsConfig, RedisConfig};
use campaign_core::types::{AnalyticsEvent, Campaign};
use campaign_core::{CampaignError, CampaignResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Campaign store over a shared, auto-reconnecting Redis connection.
///
/// The manager is opened once at startup and cloned per call; clones share
/// the underlying multiplexed connection and are released when dropped.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    queue_key: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .field("queue_key", &self.queue_key)
            .finish()
    }
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(
        config: &RedisConfig,
        analytics: &AnalyticsConfig,
    ) -> anyhow::Result<Self> {
        let url = config.connection_url()?;

        info!(
            host = %config.host,
            port = config.port,
            tls = config.tls,
            "Connecting to Redis"
        );

        let client = redis::Client::open(url.as_str())?;
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let mut conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| anyhow::anyhow!("Redis connection timed out after {timeout:?}"))??;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            conn,
            queue_key: analytics.queue_key.clone(),
        })
    }
}

#[async_trait]
impl CampaignStore for RedisStore {
    async fn load(&self, key: &str) -> CampaignResult<Option<Campaign>> {
        let record_key = campaign_record_key(key);
        let mut conn = self.conn.clone();

        let data: Option<String> = conn
            .get(&record_key)
            .await
            .map_err(|e| CampaignError::Store(format!("Redis GET {record_key} failed: {e}")))?;

        match data {
            Some(json) => {
                let campaign: Campaign = serde_json::from_str(&json)?;
                metrics::counter!("store.load.hit").increment(1);
                Ok(Some(campaign))
            }
            None => {
                metrics::counter!("store.load.miss").increment(1);
                debug!(key = %key, "Campaign record not found");
                Ok(None)
            }
        }
    }

    async fn save(&self, campaign: &Campaign) -> CampaignResult<()> {
        let record_key = campaign_record_key(&campaign.key);
        let json = serde_json::to_string(campaign)?;
        let mut conn = self.conn.clone();

        conn.set::<_, _, ()>(&record_key, json)
            .await
            .map_err(|e| CampaignError::Persistence(format!("Redis SET {record_key} failed: {e}")))?;

        debug!(
            key = %campaign.key,
            cycles_done = campaign.cycles_done,
            "Campaign record saved"
        );
        Ok(())
    }

    async fn enqueue_analytics(&self, event: &AnalyticsEvent) -> CampaignResult<()> {
        let json = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();

        conn.lpush::<_, _, ()>(&self.queue_key, json)
            .await
            .map_err(|e| {
                CampaignError::Analytics(format!("Redis LPUSH {} failed: {e}", self.queue_key))
            })?;

        Ok(())
    }

    async fn ping(&self) -> CampaignResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CampaignError::Store(format!("Redis PING failed: {e}")))?;
        Ok(())
    }
}
