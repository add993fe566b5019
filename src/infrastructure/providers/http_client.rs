//! JSON over HTTP with upstream failures classified for the chain executor

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response, StatusCode};

use crate::domain::provider::ProviderError;
use crate::domain::DomainError;

/// HTTP operations adapters need (mockable)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    async fn get_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
    ) -> Result<serde_json::Value, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Client with an overall request timeout, as a backstop behind the
    /// per-attempt deadline
    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn send(
        &self,
        request: RequestBuilder,
        headers: Vec<(&str, &str)>,
    ) -> Result<serde_json::Value, ProviderError> {
        let request = headers
            .into_iter()
            .fold(request, |req, (key, value)| req.header(key, value));

        let response = request.send().await.map_err(classify_transport_error)?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::fatal(format!("Failed to parse response: {}", e)))
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        self.send(self.client.post(url).json(body), headers).await
    }

    async fn get_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
    ) -> Result<serde_json::Value, ProviderError> {
        self.send(self.client.get(url), headers).await
    }
}

fn classify_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProviderError::retryable(format!("Request failed: {}", err))
    } else {
        ProviderError::fatal(format!("Request failed: {}", err))
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    Err(classify_status(status, retry_after, &body))
}

/// 429 is a rate limit, 408 and 5xx are worth retrying, any other status
/// is final
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));

    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::rate_limited(message, retry_after)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ProviderError::retryable(message)
    } else {
        ProviderError::fatal(message)
    }
}

/// Only the delta-seconds form; HTTP dates are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned responses by URL; records every request body it receives
    #[derive(Debug, Default)]
    pub struct MockHttpClient {
        responses: Mutex<HashMap<String, Result<serde_json::Value, ProviderError>>>,
        requests: Mutex<Vec<(String, Option<serde_json::Value>, Vec<(String, String)>)>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(self, url: impl Into<String>, response: serde_json::Value) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url.into(), Ok(response));
            self
        }

        pub fn with_error(self, url: impl Into<String>, error: ProviderError) -> Self {
            self.responses.lock().unwrap().insert(url.into(), Err(error));
            self
        }

        pub fn last_body(&self) -> Option<serde_json::Value> {
            self.requests
                .lock()
                .unwrap()
                .last()
                .and_then(|(_, body, _)| body.clone())
        }

        pub fn last_header(&self, name: &str) -> Option<String> {
            self.requests.lock().unwrap().last().and_then(|(_, _, headers)| {
                headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v.clone())
            })
        }

        fn respond(
            &self,
            url: &str,
            headers: Vec<(&str, &str)>,
            body: Option<&serde_json::Value>,
        ) -> Result<serde_json::Value, ProviderError> {
            self.requests.lock().unwrap().push((
                url.to_string(),
                body.cloned(),
                headers
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));

            self.responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::fatal(format!("No mock response for {}", url))))
        }
    }

    #[async_trait]
    impl HttpClientTrait for MockHttpClient {
        async fn post_json(
            &self,
            url: &str,
            headers: Vec<(&str, &str)>,
            body: &serde_json::Value,
        ) -> Result<serde_json::Value, ProviderError> {
            self.respond(url, headers, Some(body))
        }

        async fn get_json(
            &self,
            url: &str,
            headers: Vec<(&str, &str)>,
        ) -> Result<serde_json::Value, ProviderError> {
            self.respond(url, headers, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_success_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/answer"))
            .and(header("authorization", "Bearer k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let json = client
            .post_json(
                &format!("{}/v1/answer", server.uri()),
                vec![("Authorization", "Bearer k")],
                &serde_json::json!({}),
            )
            .await
            .unwrap();

        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn test_429_is_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = HttpClient::new()
            .get_json(&format!("{}/jobs/1", server.uri()), vec![])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProviderError::rate_limited("HTTP 429: slow down", Some(Duration::from_secs(7)))
        );
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = HttpClient::new()
            .post_json(&server.uri(), vec![], &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = HttpClient::new()
            .post_json(&server.uri(), vec![], &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Fatal { .. }));
        assert!(err.message().contains("bad key"));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out_as_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HttpClient::with_timeout(Duration::from_millis(50)).unwrap();
        let err = client.get_json(&server.uri(), vec![]).await.unwrap_err();

        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_request_timeout_status() {
        let err = classify_status(StatusCode::REQUEST_TIMEOUT, None, "");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retry_after_ignores_http_dates() {
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
