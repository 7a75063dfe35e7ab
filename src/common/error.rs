use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegratorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The IPED API answered, but the answer can't be trusted.
    #[error("IPED response rejected ({status}): {reason} - body: {body}")]
    Response {
        status: u16,
        body: String,
        reason: String,
    },

    #[error("Transform stage '{stage}' failed on column '{column}' (row {row:?}, value {value:?}): {reason}")]
    Transform {
        stage: &'static str,
        column: String,
        row: Option<usize>,
        value: Option<String>,
        reason: String,
    },

    /// Delivery to Salesforce failed. The send buffer is left untouched so the
    /// batch can be delivered again.
    #[error("Salesforce delivery failed ({status:?}): {body}")]
    Delivery { status: Option<u16>, body: String },
}

impl IntegratorError {
    pub fn response(status: u16, body: impl Into<String>, reason: impl Into<String>) -> Self {
        IntegratorError::Response {
            status,
            body: body.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        IntegratorError::Config(message.into())
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            IntegratorError::Http(_) | IntegratorError::Delivery { .. } => true,
            IntegratorError::Response { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IntegratorError>;
