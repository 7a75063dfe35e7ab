use crate::app::ports::{FormFields, HttpClientPort, HttpResponse};
use crate::common::error::Result;
use crate::infra::rate_limiter::RateLimiter;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct ReqwestHttp {
    client: reqwest::Client,
    limiter: Option<RateLimiter>,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration, requests_per_min: Option<u64>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            limiter: requests_per_min.filter(|rpm| *rpm > 0).map(RateLimiter::new),
        })
    }

    async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
    }

    async fn read(resp: reqwest::Response, started: Instant, url: &str) -> Result<HttpResponse> {
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        let secs = started.elapsed().as_secs_f64();
        crate::observability::metrics::sources::request_duration(secs);
        if (200..=299).contains(&status) {
            crate::observability::metrics::sources::request_success();
        } else {
            crate::observability::metrics::sources::request_error();
        }
        debug!(url, status, bytes = body.len(), secs, "HTTP response");
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn post_form(&self, url: &str, form: &FormFields) -> Result<HttpResponse> {
        self.pace().await;
        let started = Instant::now();
        let resp = self.client.post(url).form(form).send().await?;
        Self::read(resp, started, url).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.pace().await;
        let started = Instant::now();
        let resp = self.client.get(url).send().await?;
        Self::read(resp, started, url).await
    }
}
