#![warn(clippy::unwrap_used)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use dispatch::{build_redirect_url, dispatch, Dispatch, DispatchOutcome};
pub use error::{CampaignError, CampaignResult};
pub use types::{AnalyticsEvent, AnalyticsParam, Campaign, EventType, Page};
