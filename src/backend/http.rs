// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;
use vsentry_core::{PlanInfo, Tier};

use super::wire::{extract_detail, ActionResponse, StatusResponse};
use super::{BackendError, BackendResult, SubscriptionBackend};
use crate::observability::Sensitive;

const API_PREFIX: &str = "api/v1/subscription/";

/// Subscription API over HTTPS with the dashboard's session cookie.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    session_cookie: Option<Sensitive<String>>,
    timeout_ms: u64,
}

impl HttpBackend {
    pub fn new(
        base_url: &Url,
        timeout: Duration,
        session_cookie: Option<Sensitive<String>>,
    ) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::network(format!("Failed to build HTTP client: {}", e)))?;

        // `Url::join` drops the last path segment unless it ends with '/'
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            session_cookie,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn endpoint(&self, name: &str) -> BackendResult<Url> {
        self.base_url
            .join(API_PREFIX)
            .and_then(|api| api.join(name))
            .map_err(|e| BackendError::network(format!("Invalid endpoint {}: {}", name, e)))
    }

    fn request(&self, method: Method, name: &str) -> BackendResult<RequestBuilder> {
        let url = self.endpoint(name)?;
        let mut builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        if let Some(cookie) = &self.session_cookie {
            builder = builder.header(header::COOKIE, cookie.expose().as_str());
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let response = builder.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body).unwrap_or_else(|| format!("HTTP {}", status));
        Err(BackendError::http(status.as_u16(), detail))
    }

    async fn get_json<T: DeserializeOwned>(&self, name: &str) -> BackendResult<T> {
        let response = self.send(self.request(Method::GET, name)?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::decode(e.to_string()))
    }

    /// A 2xx answer only confirms the action if its body does not say
    /// `"success": false`.
    async fn post_action(&self, builder: RequestBuilder) -> BackendResult<ActionResponse> {
        let response = self.send(builder).await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_transport(e))?;
        if body.trim().is_empty() {
            return Ok(ActionResponse::default());
        }

        let ack: ActionResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::decode(e.to_string()))?;
        if !ack.success {
            let detail = ack
                .message
                .unwrap_or_else(|| "Request was not successful".to_string());
            return Err(BackendError::http(status, detail));
        }
        Ok(ack)
    }

    fn map_transport(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else if err.is_decode() {
            BackendError::decode(err.to_string())
        } else {
            BackendError::network(err.to_string())
        }
    }
}

#[async_trait]
impl SubscriptionBackend for HttpBackend {
    fn backend_id(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn fetch_status(&self) -> BackendResult<StatusResponse> {
        self.get_json("status").await
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn fetch_plans(&self) -> BackendResult<Vec<PlanInfo>> {
        self.get_json("plans").await
    }

    #[instrument(skip_all, fields(base = %self.base_url, tier = tier.as_str()))]
    async fn upgrade(&self, tier: Tier) -> BackendResult<ActionResponse> {
        debug!("Requesting upgrade");
        let builder = self
            .request(Method::POST, "upgrade")?
            .json(&json!({ "tier": tier }));
        self.post_action(builder).await
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    async fn start_trial(&self) -> BackendResult<ActionResponse> {
        debug!("Requesting trial start");
        self.post_action(self.request(Method::POST, "start-trial")?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(
            &Url::parse(base).unwrap(),
            Duration::from_secs(5),
            Some(Sensitive::new("session=abc123".to_string())),
        )
        .unwrap()
    }

    #[test]
    fn endpoints_join_under_api_prefix() {
        let b = backend("https://sentry.example.com");
        assert_eq!(
            b.endpoint("status").unwrap().as_str(),
            "https://sentry.example.com/api/v1/subscription/status"
        );
        assert_eq!(
            b.endpoint("start-trial").unwrap().as_str(),
            "https://sentry.example.com/api/v1/subscription/start-trial"
        );
    }

    #[test]
    fn base_path_is_preserved() {
        let b = backend("https://example.com/dashboard");
        assert_eq!(
            b.endpoint("plans").unwrap().as_str(),
            "https://example.com/dashboard/api/v1/subscription/plans"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        // Port 9 (discard) on localhost is almost never listening
        let b = backend("http://127.0.0.1:9");
        let err = b.fetch_status().await.unwrap_err();
        assert!(
            matches!(err, BackendError::Network { .. } | BackendError::Timeout { .. }),
            "unexpected error: {:?}",
            err
        );
    }

    /// Answers a single request with a canned response and returns the
    /// server's base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                    let length = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn forbidden_maps_to_unauthorized() {
        let base = serve_once("403 Forbidden", r#"{"detail":"Not authenticated"}"#).await;
        let err = backend(&base).fetch_status().await.unwrap_err();
        assert_eq!(err, BackendError::Unauthorized);
    }

    #[tokio::test]
    async fn error_detail_is_taken_from_body() {
        let base = serve_once(
            "400 Bad Request",
            r#"{"detail":"You already have an active trial"}"#,
        )
        .await;
        let err = backend(&base).start_trial().await.unwrap_err();
        assert_eq!(err, BackendError::http(400, "You already have an active trial"));
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn error_without_detail_names_the_status() {
        let base = serve_once("502 Bad Gateway", "<html>upstream down</html>").await;
        let err = backend(&base).fetch_plans().await.unwrap_err();
        assert_eq!(err, BackendError::http(502, "HTTP 502 Bad Gateway"));
    }

    #[tokio::test]
    async fn empty_success_body_is_a_confirmation() {
        let base = serve_once("204 No Content", "").await;
        let ack = backend(&base).upgrade(Tier::Premium).await.unwrap();
        assert_eq!(ack, ActionResponse::default());
    }

    #[tokio::test]
    async fn unsuccessful_ack_is_an_error() {
        let base = serve_once(
            "200 OK",
            r#"{"success":false,"message":"Payment method declined"}"#,
        )
        .await;
        let err = backend(&base).upgrade(Tier::Premium).await.unwrap_err();
        assert_eq!(err, BackendError::http(200, "Payment method declined"));
    }

    #[tokio::test]
    async fn malformed_status_body_is_a_decode_error() {
        let base = serve_once("200 OK", r#"{"tier":"gold"}"#).await;
        let err = backend(&base).fetch_status().await.unwrap_err();
        assert!(matches!(err, BackendError::Decode { .. }), "unexpected error: {:?}", err);
    }

    #[test]
    fn session_cookie_is_redacted_in_debug() {
        let b = backend("https://example.com");
        let rendered = format!("{:?}", b.session_cookie);
        assert!(!rendered.contains("abc123"));
    }
}
