use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::GatewayError;
use crate::limiter::TokenBucket;
use wayfare_resilience::Executor;
use wayfare_shared::{AppError, AppResult};

const BODY_SNIPPET_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Label used in error envelopes and logs.
    pub service: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    /// `None` disables client-side rate limiting.
    pub requests_per_second: Option<f64>,
    pub burst: u32,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            service: "http".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            requests_per_second: Some(10.0),
            burst: 20,
            user_agent: concat!("wayfare/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    /// Newline-delimited JSON, one document per line, trailing newline included.
    Ndjson(String),
}

/// One outbound call. Cheap to clone so the executor can replay it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: Vec::new(), query: Vec::new(), body: None }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> AppResult<Self> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    pub fn ndjson(mut self, body: String) -> Self {
        self.body = Some(RequestBody::Ndjson(body));
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = Some(RequestBody::Form(
            fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        ));
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            AppError::external(format!("undecodable response body: {}", e)).retryable(false)
        })
    }
}

/// Pooled JSON client. Every outbound call first takes a limiter token;
/// [`HttpClient::execute`] additionally runs through the resilience executor
/// when one is attached.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    limiter: Option<Arc<TokenBucket>>,
    executor: Option<Executor>,
    service: String,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, GatewayError> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(config.user_agent)
            .build()?;
        let limiter = config
            .requests_per_second
            .map(|rps| Arc::new(TokenBucket::new(rps, config.burst)));
        Ok(Self { inner, limiter, executor: None, service: config.service })
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Send with retry/breaker/deadline (when configured) and fail on any
    /// non-2xx status.
    pub async fn execute(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        match &self.executor {
            Some(executor) => executor.execute(|| self.send_checked(request.clone())).await,
            None => self.send_checked(request).await,
        }
    }

    /// Send once; only transport failures are errors, any status is returned.
    pub async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let mut builder = self.inner.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Ndjson(body)) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body.clone()),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| self.transport_error(&request, e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| self.transport_error(&request, e))?;
        debug!(service = %self.service, method = %request.method, url = %request.url, status, "outbound request");
        Ok(HttpResponse { status, headers, body })
    }

    async fn send_checked(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        let response = self.send(request.clone()).await?;
        check_status(&response, &request).map_err(|e| e.with_service(&self.service))?;
        Ok(response)
    }

    fn transport_error(&self, request: &HttpRequest, err: reqwest::Error) -> AppError {
        let app = if err.is_timeout() {
            AppError::timeout(format!("{} {} timed out", request.method, request.url))
        } else {
            AppError::external(format!("{} {} failed: {}", request.method, request.url, err))
                .retryable(true)
        };
        app.with_service(&self.service)
    }
}

/// Map a completed response to the error taxonomy.
pub fn check_status(response: &HttpResponse, request: &HttpRequest) -> AppResult<()> {
    if response.is_success() {
        return Ok(());
    }
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = format!("{} {} returned {}", request.method, request.url, status);
    let err = if status == StatusCode::TOO_MANY_REQUESTS {
        AppError::rate_limited(message, retry_after(&response.headers))
    } else if status.is_server_error() {
        AppError::bad_gateway(message)
    } else {
        AppError::external(message).retryable(false)
    };
    Err(err
        .with_detail("upstream_status", response.status)
        .with_detail("upstream_body", snippet(&response.body)))
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET_LIMIT) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_resilience::{BreakerManager, ExecutorConfig, RetryPolicy};
    use wayfare_shared::codes;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(HttpClientConfig {
            service: "vendor".to_string(),
            timeout: Duration::from_millis(300),
            requests_per_second: Some(1000.0),
            burst: 100,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_passes_headers_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("x-trace", "abc"))
            .and(query_param("q", "lon"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let response = client()
            .execute(
                HttpRequest::get(format!("{}/ping", server.uri()))
                    .header("x-trace", "abc")
                    .query("q", "lon"),
            )
            .await
            .unwrap();
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client().execute(HttpRequest::get(server.uri())).await.unwrap_err();
        assert!(err.is(codes::BAD_GATEWAY));
        assert!(err.retryable);
        assert_eq!(err.details["upstream_status"], 503);
        assert_eq!(err.service.as_deref(), Some("vendor"));
    }

    #[tokio::test]
    async fn test_too_many_requests_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = client().execute(HttpRequest::get(server.uri())).await.unwrap_err();
        assert!(err.is(codes::RATE_LIMIT_EXCEEDED));
        assert!(err.retryable);
        assert_eq!(err.retry_after_seconds(), Some(7));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad keyword"))
            .mount(&server)
            .await;

        let err = client().execute(HttpRequest::get(server.uri())).await.unwrap_err();
        assert!(err.is(codes::EXTERNAL_SERVICE_ERROR));
        assert!(!err.retryable);
        assert_eq!(err.details["upstream_body"], "bad keyword");
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = client().execute(HttpRequest::get(server.uri())).await.unwrap_err();
        assert!(err.is(codes::TIMEOUT));
    }

    #[tokio::test]
    async fn test_connection_refused_is_external() {
        let err = client()
            .execute(HttpRequest::get("http://127.0.0.1:9/unreachable"))
            .await
            .unwrap_err();
        assert!(err.is(codes::EXTERNAL_SERVICE_ERROR) || err.is(codes::TIMEOUT));
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn test_executor_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let executor = Executor::new(
            ExecutorConfig::new("vendor-test").with_retry(RetryPolicy {
                initial_delay: Duration::from_millis(10),
                ..Default::default()
            }),
            &BreakerManager::new(),
        );
        let response = client()
            .with_executor(executor)
            .execute(HttpRequest::get(server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(600);
        assert_eq!(snippet(&long).chars().count(), BODY_SNIPPET_LIMIT);
        assert_eq!(snippet("short"), "short");
    }
}
