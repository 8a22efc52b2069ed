use crate::validation::ValidationErrors;
use crate::webhook::WebhookStage;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("no matching registration")]
    NotFound,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("failed to serialise payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("reconciliation failed at {stage}: {reason}")]
    Reconciliation { stage: WebhookStage, reason: String },
}

impl From<ValidationErrors> for BridgeError {
    fn from(errors: ValidationErrors) -> Self {
        BridgeError::Validation(errors)
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
