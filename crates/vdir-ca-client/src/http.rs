//! # HTTP Certificate Authority Client
//!
//! [`CertAuthority`] over the vendor REST API.
//!
//! ## Authentication
//!
//! Access tokens are cached with their expiry. A stale token is refreshed
//! with the refresh token; if that fails the client logs in again with the
//! configured username and password. A request answered with 401 clears the
//! cache and is replayed once with new credentials. Callers only see
//! [`CaError::Unauthorized`] when every one of those steps fails.
//!
//! ## Timeout & Retry
//!
//! Every request carries the configured timeout; a timeout surfaces as the
//! transient [`CaError::Timeout`]. Idempotent reads retry transport failures
//! with backoff, but all attempts of one read share that same timeout.
//! Batch submission is sent exactly once.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::authority::{Authority, BatchParams, BatchResponse, CertAuthority, ProcessingInfo};
use crate::config::SectigoConfig;
use crate::error::CaError;
use crate::retry::{retry_send, RetryPolicy};

/// Lifetime assumed for an access token when the server does not say.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(600);

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
struct Tokens {
    access: Zeroizing<String>,
    refresh: Option<Zeroizing<String>>,
    expires_at: Instant,
}

impl Tokens {
    fn from_response(resp: AuthResponse) -> Self {
        let ttl = resp
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        Self {
            access: Zeroizing::new(resp.access_token),
            refresh: resp.refresh_token.map(Zeroizing::new),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_valid(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Live certificate authority client.
pub struct HttpCertAuthority {
    client: reqwest::Client,
    config: SectigoConfig,
    retry: RetryPolicy,
    tokens: Mutex<Option<Tokens>>,
}

impl std::fmt::Debug for HttpCertAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCertAuthority")
            .field("config", &self.config)
            .field("authenticated", &self.tokens.lock().is_some())
            .finish()
    }
}

impl HttpCertAuthority {
    /// Build a client from configuration. No request is made until first use.
    pub fn new(config: SectigoConfig) -> Result<Self, CaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("vdir/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CaError::NotConfigured {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            retry: RetryPolicy::within(Duration::from_secs(config.timeout_secs)),
            config,
            tokens: Mutex::new(None),
        })
    }

    fn block_on<T>(&self, fut: impl Future<Output = Result<T, CaError>>) -> Result<T, CaError> {
        let rt = tokio::runtime::Handle::try_current().map_err(|_| CaError::NotConfigured {
            reason: "no async runtime available for HTTP request".into(),
        })?;
        rt.block_on(fut)
    }

    fn transport_error(&self, operation: &'static str, e: reqwest::Error) -> CaError {
        if e.is_timeout() {
            CaError::Timeout {
                operation,
                elapsed_ms: self.config.timeout_secs * 1000,
            }
        } else {
            CaError::Unavailable {
                operation,
                reason: e.to_string(),
            }
        }
    }

    async fn check_status(
        &self,
        operation: &'static str,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, CaError> {
        let status = resp.status();
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CaError::Unavailable {
                operation,
                reason: format!("HTTP {status}: {body}"),
            });
        }
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CaError::Rejected {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        resp: reqwest::Response,
    ) -> Result<T, CaError> {
        resp.json().await.map_err(|e| CaError::InvalidResponse {
            operation,
            reason: format!("response deserialization failed: {e}"),
        })
    }

    async fn credentials_exchange(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Tokens, CaError> {
        let resp = request
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))?;
        let status = resp.status();
        if status.is_client_error() {
            return Err(CaError::Unauthorized {
                reason: format!("{operation}: HTTP {status}"),
            });
        }
        let resp = self.check_status(operation, resp).await?;
        let auth: AuthResponse = Self::decode(operation, resp).await?;
        Ok(Tokens::from_response(auth))
    }

    async fn login(&self) -> Result<Tokens, CaError> {
        let body = serde_json::json!({
            "username": self.config.username,
            "password": self.config.password.as_str(),
        });
        let request = self.client.post(self.config.endpoint("/auth")).json(&body);
        self.credentials_exchange("authenticate", request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, CaError> {
        let request = self
            .client
            .post(self.config.endpoint("/auth/refresh"))
            .bearer_auth(refresh_token);
        self.credentials_exchange("refresh", request).await
    }

    fn store_tokens(&self, tokens: Tokens) -> Zeroizing<String> {
        let access = tokens.access.clone();
        *self.tokens.lock() = Some(tokens);
        access
    }

    /// A usable access token, refreshing or logging in as needed.
    async fn access_token(&self) -> Result<Zeroizing<String>, CaError> {
        let refresh = {
            let guard = self.tokens.lock();
            match guard.as_ref() {
                Some(tokens) if tokens.is_valid() => return Ok(tokens.access.clone()),
                Some(tokens) => tokens.refresh.clone(),
                None => None,
            }
        };

        if let Some(refresh) = refresh {
            match self.refresh(&refresh).await {
                Ok(tokens) => return Ok(self.store_tokens(tokens)),
                Err(e) => tracing::debug!(error = %e, "token refresh failed; logging in again"),
            }
        }

        let tokens = self.login().await?;
        Ok(self.store_tokens(tokens))
    }

    async fn dispatch<F>(
        &self,
        operation: &'static str,
        retry: bool,
        make: F,
    ) -> Result<reqwest::Response, CaError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        if retry {
            retry_send(operation, self.retry, || make().send(), |e| {
                self.transport_error(operation, e)
            })
            .await
        } else {
            make()
                .send()
                .await
                .map_err(|e| self.transport_error(operation, e))
        }
    }

    /// Send an authenticated request, replaying it once after a 401.
    async fn authorized<B>(
        &self,
        operation: &'static str,
        retry: bool,
        build: B,
    ) -> Result<reqwest::Response, CaError>
    where
        B: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.access_token().await?;
        let resp = self.dispatch(operation, retry, || build(&token)).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return self.check_status(operation, resp).await;
        }

        tracing::debug!(operation, "access token rejected; re-authenticating");
        self.tokens.lock().take();
        let token = self.access_token().await?;
        let resp = self.dispatch(operation, retry, || build(&token)).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(CaError::Unauthorized {
                reason: format!("{operation}: access token rejected after re-authentication"),
            });
        }
        self.check_status(operation, resp).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<T, CaError> {
        let url = self.config.endpoint(path);
        let resp = self
            .authorized(operation, true, |token| {
                self.client.get(&url).bearer_auth(token)
            })
            .await?;
        Self::decode(operation, resp).await
    }
}

impl CertAuthority for HttpCertAuthority {
    fn authenticate(&self) -> Result<(), CaError> {
        self.tokens.lock().take();
        self.block_on(async {
            let tokens = self.login().await?;
            self.store_tokens(tokens);
            Ok(())
        })
    }

    fn list_authorities(&self) -> Result<Vec<Authority>, CaError> {
        self.block_on(self.get_json("list_authorities", "/api/v1/users/current/authorities"))
    }

    fn authority_balance(&self, authority_id: i64) -> Result<i64, CaError> {
        let path = format!("/api/v1/authorities/{authority_id}/balance/available");
        self.block_on(self.get_json("authority_balance", &path))
    }

    fn submit_batch(
        &self,
        authority_id: i64,
        batch_name: &str,
        params: &BatchParams,
    ) -> Result<BatchResponse, CaError> {
        let url = self
            .config
            .endpoint("/api/v1/batches/createSingleCertBatch");
        let body = serde_json::json!({
            "authorityId": authority_id,
            "batchName": batch_name,
            "profileParams": params.to_profile_params(),
        });

        self.block_on(async {
            let resp = self
                .authorized("submit_batch", false, |token| {
                    self.client.post(&url).bearer_auth(token).json(&body)
                })
                .await?;
            Self::decode("submit_batch", resp).await
        })
    }

    fn batch_detail(&self, batch_id: i64) -> Result<BatchResponse, CaError> {
        let path = format!("/api/v1/batches/{batch_id}");
        self.block_on(self.get_json("batch_detail", &path))
    }

    fn processing_status(&self, batch_id: i64) -> Result<ProcessingInfo, CaError> {
        let path = format!("/api/v1/batches/{batch_id}/status");
        self.block_on(self.get_json("processing_status", &path))
    }

    fn download_batch(&self, batch_id: i64) -> Result<Vec<u8>, CaError> {
        let url = self
            .config
            .endpoint(&format!("/api/v1/batches/{batch_id}/download"));

        self.block_on(async {
            let resp = self
                .authorized("download_batch", true, |token| {
                    self.client.get(&url).bearer_auth(token)
                })
                .await?;
            let bytes = resp.bytes().await.map_err(|e| self.transport_error("download_batch", e))?;
            if bytes.is_empty() {
                return Err(CaError::InvalidResponse {
                    operation: "download_batch",
                    reason: "empty archive".into(),
                });
            }
            Ok(bytes.to_vec())
        })
    }

    fn adapter_name(&self) -> &'static str {
        "HttpCertAuthority"
    }
}
