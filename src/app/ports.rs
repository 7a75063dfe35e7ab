use crate::common::error::Result;
use async_trait::async_trait;

/// Form fields for an IPED request, in the order they are sent.
pub type FormFields = Vec<(String, String)>;

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

// Source-side port
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// POST `form` as `application/x-www-form-urlencoded`.
    async fn post_form(&self, url: &str, form: &FormFields) -> Result<HttpResponse>;

    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

// Sink-side port
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    /// Deliver one serialized rowset. An `Ok` means the receiver confirmed it.
    async fn deliver(&self, payload: &serde_json::Value) -> Result<()>;
}
