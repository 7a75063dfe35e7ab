use crate::apis::validate::decode_and_validate;
use crate::app::ports::{FormFields, HttpClientPort};
use crate::common::constants::API_VERSION;
use crate::common::error::Result;
use crate::common::types::{Tenancy, User};
use crate::config::IpedConfig;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Thin IPED client: builds the authenticated forms and validates every answer.
#[derive(Clone)]
pub struct IpedClient {
    http: Arc<dyn HttpClientPort>,
    config: IpedConfig,
}

impl IpedClient {
    pub fn new(http: Arc<dyn HttpClientPort>, config: IpedConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &IpedConfig {
        &self.config
    }

    /// `api_version` and the tenancy token, required by every endpoint.
    pub fn base_form(&self, tenancy: Tenancy) -> FormFields {
        vec![
            ("api_version".to_string(), API_VERSION.to_string()),
            ("token".to_string(), self.config.token(tenancy).to_string()),
        ]
    }

    /// [`Self::base_form`] plus the user's id and token.
    pub fn user_form(&self, user: &User) -> FormFields {
        let mut form = self.base_form(user.tenancy);
        form.push(("user_id".to_string(), user.id.to_string()));
        form.push(("user_token".to_string(), user.token.clone()));
        form
    }

    /// POST `form` to `url` and return the body once it passed validation.
    pub async fn post_validated(&self, url: &str, form: &FormFields, required: &[&str]) -> Result<Value> {
        debug!(url, fields = form.len(), "IPED request");
        let response = self.http.post_form(url, form).await?;
        decode_and_validate(&response, required).map_err(|e| {
            warn!(url, status = response.status, "IPED response rejected: {}", e);
            crate::observability::metrics::iped::response_rejected(url);
            e
        })
    }
}
