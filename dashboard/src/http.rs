use std::time::Duration;

use envmon_common::{RequestCounter, RetryConfig};
use reqwest::{header::CONTENT_TYPE, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    None,
    ApiKeyHeader(&'a str),
    Bearer(&'a str),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            statuses: config.statuses.clone(),
        })
    }

    fn retries_status(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status.as_u16())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Shared outbound client: fixed timeout, optional bounded retry, and a
/// per-session counter bumped on every 2xx.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    retry: Option<RetryPolicy>,
}

impl HttpClient {
    pub fn new(timeout: Duration, retry: Option<RetryPolicy>) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self { inner, retry })
    }

    pub async fn get(
        &self,
        url: &str,
        auth: Auth<'_>,
        query: &[(&str, String)],
        counter: &RequestCounter,
    ) -> Result<HttpResponse, reqwest::Error> {
        self.send(
            || authorize(self.inner.get(url).query(query), auth),
            counter,
        )
        .await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        auth: Auth<'_>,
        body: &B,
        counter: &RequestCounter,
    ) -> Result<HttpResponse, reqwest::Error> {
        self.send(|| authorize(self.inner.post(url).json(body), auth), counter)
            .await
    }

    async fn send(
        &self,
        build: impl Fn() -> RequestBuilder,
        counter: &RequestCounter,
    ) -> Result<HttpResponse, reqwest::Error> {
        let max_attempts = self.retry.as_ref().map_or(1, |policy| policy.max_attempts);
        let mut attempt = 1;

        loop {
            let retry = self.retry.as_ref().filter(|_| attempt < max_attempts);

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if let Some(policy) = retry.filter(|policy| policy.retries_status(status)) {
                        warn!(%status, attempt, "upstream server error, retrying");
                        tokio::time::sleep(policy.backoff(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    let body = response.text().await?;
                    debug!(%status, attempt, bytes = body.len(), "upstream response");
                    if status.is_success() {
                        counter.increment();
                    }
                    return Ok(HttpResponse { status, body });
                }
                Err(err) if err.is_connect() || err.is_timeout() => {
                    let Some(policy) = retry else {
                        return Err(err);
                    };
                    warn!("upstream connection failed, retrying (attempt {attempt}): {err}");
                    tokio::time::sleep(policy.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn authorize(builder: RequestBuilder, auth: Auth<'_>) -> RequestBuilder {
    let builder = builder.header(CONTENT_TYPE, "application/json");
    match auth {
        Auth::None => builder,
        Auth::ApiKeyHeader(key) => builder.header("x-api-key", key),
        Auth::Bearer(key) => builder.bearer_auth(key),
    }
}
