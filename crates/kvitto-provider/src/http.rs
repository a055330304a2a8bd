//! Generic provider HTTP client shared by all adapters.
//!
//! Wraps `reqwest` with the resilience policy every provider call needs:
//! bearer tokens from a [`TokenSource`], the exponential backoff ladder
//! for 408/5xx and network failures, a single honored-`Retry-After` retry
//! for 429, and refresh-then-retry-once for 401. Request metadata (method,
//! path, status) is traced; tokens and payloads never are.

use std::time::Duration;

use kvitto_core::ProviderId;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::ProviderError;
use crate::retry::retry_with_backoff;
use crate::token::TokenSource;

/// Resilience knobs, normally sourced from `AppConfig`.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// Ladder retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    /// Wait before the single 429 retry when no `Retry-After` was sent.
    pub rate_limit_default_wait_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 4,
            backoff_base_secs: 1,
            rate_limit_default_wait_secs: 5,
        }
    }
}

/// Authenticated JSON client for one provider API.
pub struct ProviderHttp<T: TokenSource> {
    client: reqwest::Client,
    provider: ProviderId,
    tokens: T,
    settings: HttpSettings,
}

impl<T: TokenSource> ProviderHttp<T> {
    /// Creates a client with the configured timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        provider: ProviderId,
        tokens: T,
        settings: HttpSettings,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("kvitto/0.1 (pos-reconciliation)")
            .build()?;
        Ok(Self {
            client,
            provider,
            tokens,
            settings,
        })
    }

    /// GET with query parameters, returning the parsed JSON body.
    ///
    /// # Errors
    ///
    /// See [`ProviderHttp::request`].
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        self.request(Method::GET, url, query, None).await
    }

    /// POST a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ProviderHttp::request`].
    pub async fn post(&self, url: &str, body: Value) -> Result<Value, ProviderError> {
        self.request(Method::POST, url, &[], Some(body)).await
    }

    /// DELETE, tolerating an empty response body.
    ///
    /// # Errors
    ///
    /// See [`ProviderHttp::request`].
    pub async fn delete(&self, url: &str) -> Result<(), ProviderError> {
        self.request(Method::DELETE, url, &[], None).await?;
        Ok(())
    }

    /// Sends one logical request under the full resilience policy:
    /// backoff ladder for transient failures, then — outside the ladder —
    /// at most one extra attempt after a 429's requested wait.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::RateLimited`] — still 429 after the single wait.
    /// - [`ProviderError::Unauthorized`] — 401 after refresh and retry.
    /// - [`ProviderError::NotFound`] / [`ProviderError::UnexpectedStatus`]
    ///   — terminal upstream statuses.
    /// - [`ProviderError::Http`] / [`ProviderError::Deserialize`] —
    ///   transport and body-shape failures after the ladder is exhausted.
    async fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, ProviderError> {
        let outcome = retry_with_backoff(
            self.settings.max_retries,
            self.settings.backoff_base_secs,
            || self.attempt(method.clone(), url, query, body.clone(), true),
        )
        .await;

        match outcome {
            Err(ProviderError::RateLimited {
                retry_after_secs, ..
            }) => {
                tracing::warn!(
                    provider = %self.provider,
                    %method,
                    path = url,
                    retry_after_secs,
                    "rate limited — waiting once before final attempt"
                );
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                self.attempt(method, url, query, body, false).await
            }
            other => other,
        }
    }

    /// One wire attempt. With `allow_recovery`, a 401 triggers one
    /// single-flight token refresh and one resend of the same request.
    async fn attempt(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        allow_recovery: bool,
    ) -> Result<Value, ProviderError> {
        let token = self.tokens.bearer().await?;
        let response = self
            .send(method.clone(), url, query, body.as_ref(), &token)
            .await?;
        let status = response.status();
        tracing::debug!(provider = %self.provider, %method, path = url, status = status.as_u16(), "provider response");

        if status == StatusCode::UNAUTHORIZED && allow_recovery {
            let fresh = self.tokens.invalidate(&token).await?;
            let retried = self.send(method.clone(), url, query, body.as_ref(), &fresh).await?;
            let retried_status = retried.status();
            tracing::debug!(
                provider = %self.provider,
                %method,
                path = url,
                status = retried_status.as_u16(),
                "provider response after token refresh"
            );
            if retried_status == StatusCode::UNAUTHORIZED {
                return Err(ProviderError::Unauthorized {
                    provider: self.provider.to_string(),
                });
            }
            return self.classify(retried, url).await;
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized {
                provider: self.provider.to_string(),
            });
        }

        self.classify(response, url).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        token: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut request = self.client.request(method, url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(json) = body {
            request = request.json(json);
        }
        Ok(request.send().await?)
    }

    /// Maps a non-401 response to a value or typed error.
    async fn classify(
        &self,
        response: reqwest::Response,
        url: &str,
    ) -> Result<Value, ProviderError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(self.settings.rate_limit_default_wait_secs);
            return Err(ProviderError::RateLimited {
                provider: self.provider.to_string(),
                retry_after_secs,
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                url: url.to_owned(),
            });
        }

        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ProviderError::Deserialize {
            context: url.to_owned(),
            source: e,
        })
    }
}
