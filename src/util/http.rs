//! JSON-over-HTTP client paced by a `RateLimiter` and retried by a `RetryPolicy`

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::CollectorError;
use crate::util::retry::{RateLimiter, RetryPolicy};

pub struct PacedClient {
    client: Client,
    name: &'static str,
    base_url: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl PacedClient {
    pub fn new(
        name: &'static str,
        base_url: &str,
        timeout: Duration,
        min_interval: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(min_interval),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GETs `{base_url}/{path}` (or the base URL itself for an empty path).
    /// Every attempt waits for the limiter; 404 maps to `NotFound`.
    pub async fn get_json<T: DeserializeOwned + Send>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CollectorError> {
        let url = if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        };

        self.retry
            .run(operation, || {
                let url = &url;
                async move {
                    self.limiter.acquire().await;
                    debug!(api = self.name, url = %url, "HTTP request");

                    let response = self.client.get(url).query(query).send().await?;
                    match response.status() {
                        status if status.is_success() => Ok(response.json::<T>().await?),
                        StatusCode::NOT_FOUND => Err(CollectorError::NotFound(format!("{} {}", self.name, path))),
                        status => Err(CollectorError::Status {
                            status: status.as_u16(),
                            endpoint: self.name.to_string(),
                        }),
                    }
                }
            })
            .await
    }
}
