//! JSON HTTP client for talking to the identity provider.
//!
//! Every call buffers the full response body and parses it as JSON before
//! resolving; a body that is not valid UTF-8 JSON is a decode failure.
//! Non-2xx statuses are not treated as failures on their own: providers
//! report most errors as JSON bodies, and callers inspect those.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{GatewayError, Result};

/// Default bound on a single outbound call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Issues GET/POST requests with JSON bodies to a provider host.
#[derive(Debug, Clone)]
pub struct JsonClient {
    http_client: reqwest::Client,
    scheme: &'static str,
    timeout: Duration,
}

impl Default for JsonClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl JsonClient {
    /// Create a client that talks HTTPS to `host:443`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            scheme: "https",
            timeout,
        }
    }

    /// Talk plain HTTP instead of HTTPS. Only meant for local stub providers.
    pub fn plaintext(mut self) -> Self {
        self.scheme = "http";
        self
    }

    /// POST `body` as JSON and parse the JSON response.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        host: &str,
        path: &str,
        body: &B,
    ) -> Result<Value> {
        self.post_json_until(host, path, body, Instant::now() + self.timeout)
            .await
    }

    /// GET and parse the JSON response.
    pub async fn get_json(&self, host: &str, path: &str) -> Result<Value> {
        self.get_json_until(host, path, Instant::now() + self.timeout)
            .await
    }

    /// Like [`post_json`](Self::post_json), bounded by an explicit deadline.
    pub async fn post_json_until<B: Serialize + ?Sized>(
        &self,
        host: &str,
        path: &str,
        body: &B,
        deadline: Instant,
    ) -> Result<Value> {
        let url = self.url(host, path)?;
        tracing::debug!("POST {}", url);

        let request = self
            .http_client
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(body);

        self.send(request, &url, deadline).await
    }

    /// Like [`get_json`](Self::get_json), bounded by an explicit deadline.
    pub async fn get_json_until(&self, host: &str, path: &str, deadline: Instant) -> Result<Value> {
        let url = self.url(host, path)?;
        tracing::debug!("GET {}", redact_query(&url));

        let request = self
            .http_client
            .get(&url)
            .header(ACCEPT, "application/json");

        self.send(request, &url, deadline).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        deadline: Instant,
    ) -> Result<Value> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, GatewayError>((status, body))
        };

        let (status, body) = tokio::time::timeout_at(deadline, exchange)
            .await
            .map_err(|_| {
                tracing::error!("Request to {} timed out", redact_query(url));
                GatewayError::Transport(format!("deadline expired for {}", redact_query(url)))
            })?
            .inspect_err(|e| tracing::error!("Request to {} failed: {}", redact_query(url), e))?;

        tracing::debug!("{} -> {}", redact_query(url), status);

        serde_json::from_slice(&body).map_err(|source| {
            let body = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!("Response from {} is not JSON: {}", redact_query(url), body);
            GatewayError::Decode { source, body }
        })
    }

    fn url(&self, host: &str, path: &str) -> Result<String> {
        if host.is_empty() {
            return Err(GatewayError::Transport("host must not be empty".to_string()));
        }
        if !path.starts_with('/') {
            return Err(GatewayError::Transport(format!(
                "path must start with '/': {}",
                path
            )));
        }
        Ok(format!("{}://{}{}", self.scheme, host, path))
    }
}

/// Strip the query string so tokens passed as parameters stay out of logs.
fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn stub_client() -> JsonClient {
        JsonClient::new(Duration::from_secs(2)).plaintext()
    }

    #[tokio::test]
    async fn test_post_json_echo() {
        let mut server = Server::new_async().await;
        let payload = json!({"client_id": "abc", "nested": {"list": [1, 2, 3]}});
        let mock = server
            .mock("POST", "/echo")
            .match_header("content-type", "application/json")
            .match_header("accept", "application/json")
            .match_body(Matcher::Json(payload.clone()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(payload.to_string())
            .create_async()
            .await;

        let value = stub_client()
            .post_json(&server.host_with_port(), "/echo", &payload)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value, payload);
    }

    #[tokio::test]
    async fn test_get_json_echo() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/user")
            .match_query(Matcher::UrlEncoded("access_token".into(), "tok1".into()))
            .match_header("accept", "application/json")
            .with_body(r#"{"login":"alice","id":7}"#)
            .create_async()
            .await;

        let value = stub_client()
            .get_json(&server.host_with_port(), "/api/v3/user?access_token=tok1")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value, json!({"login": "alice", "id": 7}));
    }

    #[tokio::test]
    async fn test_error_status_still_parsed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/user")
            .with_status(401)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .create_async()
            .await;

        let value = stub_client()
            .get_json(&server.host_with_port(), "/api/v3/user")
            .await
            .unwrap();

        assert_eq!(value["message"], "Bad credentials");
    }

    #[tokio::test]
    async fn test_non_json_body_is_decode_error() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/login/oauth/access_token")
            .with_body("access_token=tok1&token_type=bearer")
            .create_async()
            .await;
        let _user = server
            .mock("GET", "/api/v3/user")
            .with_body("<html>nope</html>")
            .create_async()
            .await;

        let client = stub_client();
        let host = server.host_with_port();

        let post_err = client
            .post_json(&host, "/login/oauth/access_token", &json!({}))
            .await
            .unwrap_err();
        match post_err {
            GatewayError::Decode { body, .. } => {
                assert_eq!(body, "access_token=tok1&token_type=bearer")
            }
            other => panic!("expected decode error, got {:?}", other),
        }

        let get_err = client.get_json(&host, "/api/v3/user").await.unwrap_err();
        assert!(get_err.is_decode());
    }

    #[tokio::test]
    async fn test_invalid_utf8_body_is_decode_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/user")
            .with_header("content-type", "application/json")
            .with_body(b"{\"login\":\"al\xffce\"}".to_vec())
            .create_async()
            .await;

        let err = stub_client()
            .get_json(&server.host_with_port(), "/api/v3/user")
            .await
            .unwrap_err();
        match err {
            GatewayError::Decode { body, .. } => assert!(body.contains("al\u{FFFD}ce")),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = stub_client()
            .get_json(&addr.to_string(), "/api/v3/user")
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_silent_server_hits_deadline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                if let Ok((socket, _)) = listener.accept().await {
                    held.push(socket);
                }
            }
        });

        let client = JsonClient::new(Duration::from_millis(200)).plaintext();
        let err = client
            .get_json(&addr.to_string(), "/api/v3/user")
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_rejects_bad_arguments() {
        let client = stub_client();
        assert!(client.get_json("", "/x").await.unwrap_err().is_transport());
        assert!(client
            .get_json("example.com", "no-slash")
            .await
            .unwrap_err()
            .is_transport());
    }

    #[test]
    fn test_redact_query() {
        assert_eq!(
            redact_query("https://h/api/v3/user?access_token=secret"),
            "https://h/api/v3/user"
        );
        assert_eq!(redact_query("https://h/login"), "https://h/login");
    }
}
