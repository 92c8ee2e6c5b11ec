//! Campaign Redirect — traffic-splitting redirector for weighted landing pages.
//!
//! Main entry point: loads configuration, opens the campaign store and starts
//! the HTTP server.

use campaign_api::ApiServer;
use campaign_core::config::AppConfig;
use campaign_store::{CampaignStore, InMemoryStore, RedisStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "campaign-redirect")]
#[command(about = "Traffic-splitting redirector for campaign landing pages")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); `campaign-redirect.toml` is read if present
    #[arg(long, short = 'c', env = "CAMPAIGN_REDIRECT_CONFIG")]
    config: Option<String>,

    /// Bind address (overrides config)
    #[arg(long, env = "CAMPAIGN_REDIRECT__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CAMPAIGN_REDIRECT__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Public base URL used in the tracking script (overrides config)
    #[arg(long, env = "CAMPAIGN_REDIRECT__PUBLIC__BASE_URL")]
    base_url: Option<String>,

    /// Keep campaigns in process memory instead of Redis (local development)
    #[arg(long, default_value_t = false)]
    in_memory_store: bool,

    /// JSON array of campaigns to load into the in-memory store
    #[arg(long, requires = "in_memory_store")]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "campaign_redirect=info,campaign_api=info,campaign_store=info,tower_http=info"
                    .into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Campaign Redirect starting up");

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.public.base_url = base_url;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        base_url = %config.public.base_url,
        queue_key = %config.analytics.queue_key,
        "Configuration loaded"
    );

    // Open the campaign store
    let store: Arc<dyn CampaignStore> = if cli.in_memory_store {
        let store = match &cli.seed {
            Some(path) => InMemoryStore::from_seed_file(path)?,
            None => InMemoryStore::new(),
        };
        warn!(campaigns = store.len(), "Using in-memory campaign store, state is not shared");
        Arc::new(store)
    } else {
        match RedisStore::connect(&config.redis, &config.analytics).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, "Failed to connect to Redis");
                return Err(e);
            }
        }
    };

    let api_server = ApiServer::new(config.clone(), store);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Campaign Redirect is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
