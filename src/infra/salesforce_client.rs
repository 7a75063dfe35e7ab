use crate::app::ports::DeliveryPort;
use crate::common::error::{IntegratorError, Result};
use crate::config::SalesforceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Tokens are refreshed this long before Salesforce says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Upper bound on how long a cached token is trusted.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    1080
}

struct CachedToken {
    value: String,
    valid_until: Instant,
}

/// Posts data-event rowsets, authenticating with the client-credentials grant.
pub struct SalesforceDelivery {
    client: reqwest::Client,
    config: SalesforceConfig,
    token: Mutex<Option<CachedToken>>,
}

impl SalesforceDelivery {
    pub fn new(config: SalesforceConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.valid_until {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting Salesforce access token");
        let resp = self
            .client
            .post(&self.config.auth_url)
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
            }))
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(transport_error)?;
        if !(200..=299).contains(&status) {
            return Err(IntegratorError::Delivery {
                status: Some(status),
                body: format!("token request rejected: {body}"),
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        let lifetime = Duration::from_secs(token.expires_in)
            .saturating_sub(TOKEN_EXPIRY_MARGIN)
            .min(MAX_TOKEN_LIFETIME);
        let now = Instant::now();
        let value = token.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            valid_until: now.checked_add(lifetime).unwrap_or(now),
        });
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

fn transport_error(e: reqwest::Error) -> IntegratorError {
    IntegratorError::Delivery {
        status: e.status().map(|s| s.as_u16()),
        body: e.to_string(),
    }
}

#[async_trait]
impl DeliveryPort for SalesforceDelivery {
    #[instrument(skip(self, payload), fields(url = %self.config.dataevents_url))]
    async fn deliver(&self, payload: &Value) -> Result<()> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(&self.config.dataevents_url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status().as_u16();
        if (200..=299).contains(&status) {
            info!(status, "Salesforce accepted batch");
            return Ok(());
        }

        if status == 401 {
            // next attempt fetches a fresh token
            self.invalidate_token().await;
        }
        let body = resp.text().await.unwrap_or_default();
        Err(IntegratorError::Delivery {
            status: Some(status),
            body,
        })
    }
}

/// Logs what would have been sent and confirms it.
#[derive(Debug, Default)]
pub struct DryRunDelivery;

#[async_trait]
impl DeliveryPort for DryRunDelivery {
    async fn deliver(&self, payload: &Value) -> Result<()> {
        let rows = payload.as_array().map(|a| a.len()).unwrap_or(0);
        let bytes = serde_json::to_vec(payload)?.len();
        info!(rows, bytes, "Dry run: batch not sent to Salesforce");
        Ok(())
    }
}
