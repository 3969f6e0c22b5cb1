//! Tunnel URL publishing.
//!
//! Fleet tooling discovers each device through whatever the publisher
//! reports; the default only logs.

use futures_util::future::BoxFuture;
use serde::Serialize;
use url::Url;

use crate::error::ProxyError;

/// Receives every newly discovered public tunnel URL.
pub trait UrlPublisher: Send + Sync {
    fn publish<'a>(&'a self, hostname: &'a str, url: &'a str)
    -> BoxFuture<'a, Result<(), ProxyError>>;
}

/// Emits a `tracing` event and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl UrlPublisher for LogPublisher {
    fn publish<'a>(
        &'a self,
        hostname: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(), ProxyError>> {
        Box::pin(async move {
            tracing::info!(hostname, url, "tunnel URL published");
            Ok(())
        })
    }
}

#[derive(Serialize)]
struct PublishBody<'a> {
    hostname: &'a str,
    url: &'a str,
}

/// POSTs `{hostname, url}` as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    http: reqwest::Client,
    endpoint: Url,
}

impl WebhookPublisher {
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }
}

impl UrlPublisher for WebhookPublisher {
    fn publish<'a>(
        &'a self,
        hostname: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(), ProxyError>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(self.endpoint.clone())
                .json(&PublishBody { hostname, url })
                .send()
                .await
                .map_err(|e| ProxyError::Publish(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(ProxyError::Publish(format!(
                    "webhook {} answered HTTP {status}",
                    self.endpoint
                )));
            }
            tracing::info!(hostname, url, endpoint = %self.endpoint, "tunnel URL published");
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn webhook_posts_hostname_and_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/devices"))
            .and(body_json(serde_json::json!({
                "hostname": "replifactory-07",
                "url": "https://abc.ngrok.app",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint: Url = format!("{}/devices", server.uri()).parse().unwrap();
        let publisher = WebhookPublisher::new(reqwest::Client::new(), endpoint);
        publisher
            .publish("replifactory-07", "https://abc.ngrok.app")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_failure_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let endpoint: Url = server.uri().parse().unwrap();
        let publisher = WebhookPublisher::new(reqwest::Client::new(), endpoint);
        let err = publisher.publish("host", "https://x").await.unwrap_err();
        assert!(matches!(err, ProxyError::Publish(_)));
    }
}
