// Gateway HTTP client
//
// Wraps `reqwest::Client` with base-URL joining, request logging and the
// response normalization in `envelope`. Endpoint groups (device,
// experiment, system, tunnel) are inherent methods in their own files so
// this module stays focused on transport mechanics.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::envelope;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for the Replifactory backend API.
///
/// All methods return the normalized payload; error-shaped bodies are
/// turned into [`Error`] before the caller sees them.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    long_http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    long_running_timeout: Duration,
}

impl GatewayClient {
    /// Create a client rooted at `base_url` (e.g. `http://host:3000/api`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            long_http: transport.build_long_running_client()?,
            base_url: normalize_base(base_url),
            timeout: transport.timeout,
            long_running_timeout: transport.long_running_timeout,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    ///
    /// The same client is used for long-running calls.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        let defaults = TransportConfig::default();
        Self {
            long_http: http.clone(),
            http,
            base_url: normalize_base(base_url),
            timeout: defaults.timeout,
            long_running_timeout: defaults.long_running_timeout,
        }
    }

    /// The gateway base URL (always ends in `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Join a relative API path under the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.send_error(e, self.timeout))?;
        self.parse_response(resp).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(e, self.timeout))?;
        self.parse_response(resp).await
    }

    /// POST without a body (`/connect-device`, `/save-calibration`).
    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| self.send_error(e, self.timeout))?;
        self.parse_response(resp).await
    }

    /// POST on the long-running client.
    pub(crate) async fn post_long<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!(timeout_secs = self.long_running_timeout.as_secs(), "POST {}", url);
        let resp = self
            .long_http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(e, self.long_running_timeout))?;
        self.parse_response(resp).await
    }

    /// Body-less POST on the long-running client (hardware test runs).
    pub(crate) async fn post_long_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!(timeout_secs = self.long_running_timeout.as_secs(), "POST {}", url);
        let resp = self
            .long_http
            .post(url)
            .send()
            .await
            .map_err(|e| self.send_error(e, self.long_running_timeout))?;
        self.parse_response(resp).await
    }

    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("PUT {}", url);
        let mut builder = self.http.put(url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| self.send_error(e, self.timeout))?;
        self.parse_response(resp).await
    }

    /// Read the body and normalize it into `T`.
    async fn parse_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| self.send_error(e, self.timeout))?;
        envelope::decode(status, &body)
    }

    #[allow(clippy::unused_self)]
    fn send_error(&self, err: reqwest::Error, timeout: Duration) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }
}

/// `Url::join` replaces the last segment unless the base ends in `/`.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
