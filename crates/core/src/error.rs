use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign store error: {0}")]
    Store(String),

    #[error("Campaign persistence error: {0}")]
    Persistence(String),

    #[error("Analytics queue error: {0}")]
    Analytics(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
