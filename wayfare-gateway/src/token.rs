use std::sync::RwLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::http::{HttpClient, HttpRequest};
use crate::wire::TokenResponse;
use wayfare_shared::{AppError, AppResult, Masked};

/// Tokens are refreshed this long before the vendor says they expire.
pub const REFRESH_WINDOW: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CachedToken {
    value: Masked<String>,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_WINDOW < self.expires_at
    }

    fn is_usable(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// OAuth2 client-credentials token cache for one vendor client.
///
/// At most one refresh runs at a time. While it runs, other callers keep using
/// the previous token as long as it has not actually expired.
pub struct TokenManager {
    http: HttpClient,
    token_url: String,
    client_id: String,
    client_secret: Masked<String>,
    current: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl TokenManager {
    pub fn new(http: HttpClient, base_url: &str, client_id: &str, client_secret: Masked<String>) -> Self {
        Self {
            http,
            token_url: format!("{}/v1/security/oauth2/token", base_url.trim_end_matches('/')),
            client_id: client_id.to_string(),
            client_secret,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// A bearer token valid for at least the refresh window when possible.
    pub async fn token(&self) -> AppResult<String> {
        let now = Instant::now();
        let cached = self.cached();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.expose().clone());
        }

        // Another caller is refreshing: ride on the old token while it lasts.
        let _guard = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(token) = cached.as_ref().filter(|t| t.is_usable(now)) {
                    return Ok(token.value.expose().clone());
                }
                self.refresh.lock().await
            }
        };

        // Double check: the refresh we waited on may have installed a token.
        if let Some(token) = self.cached().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.expose().clone());
        }

        let fresh = self.fetch().await?;
        let value = fresh.value.expose().clone();
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token so the next call refreshes, e.g. after a 401.
    pub fn invalidate(&self) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// Remaining validity of the cached token, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.cached()
            .map(|t| t.expires_at.saturating_duration_since(Instant::now()))
    }

    fn cached(&self) -> Option<CachedToken> {
        self.current.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn fetch(&self) -> AppResult<CachedToken> {
        let request = HttpRequest::post(&self.token_url).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose().as_str()),
        ]);
        let response = self.http.send(request).await?;
        if response.status != 200 {
            warn!(status = response.status, "vendor token request rejected");
            return Err(AppError::external(format!(
                "token endpoint returned {}",
                response.status
            ))
            .with_service(self.http.service())
            .with_operation("oauth2_token")
            .with_detail("upstream_status", response.status));
        }

        let body: TokenResponse = response.json()?;
        if body.access_token.is_empty() {
            return Err(AppError::external("token endpoint returned an empty access_token")
                .with_operation("oauth2_token"));
        }
        info!(token_type = %body.token_type, expires_in = body.expires_in, "vendor token refreshed");
        Ok(CachedToken {
            value: Masked::new(body.access_token),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClientConfig;
    use std::sync::Arc;
    use wayfare_shared::codes;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(server: &MockServer) -> TokenManager {
        let http = HttpClient::new(HttpClientConfig { requests_per_second: None, ..Default::default() }).unwrap();
        TokenManager::new(http, &server.uri(), "client-1", Masked::new("s3cret".to_string()))
    }

    fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
        serde_json::json!({
            "type": "amadeusOAuth2Token",
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": expires_in
        })
    }

    #[tokio::test]
    async fn test_token_is_cached_within_validity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/security/oauth2/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-1"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 1799)))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        assert_eq!(tokens.token().await.unwrap(), "tok-1");
        assert_eq!(tokens.token().await.unwrap(), "tok-1");
        assert!(tokens.remaining().unwrap() > REFRESH_WINDOW);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/security/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("tok-shared", 1799))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(manager(&server));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let tokens = tokens.clone();
                tokio::spawn(async move { tokens.token().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "tok-shared");
        }
    }

    #[tokio::test]
    async fn test_token_inside_refresh_window_is_renewed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/security/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-short", 120)))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        tokens.token().await.unwrap();
        tokens.token().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/security/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-old", 120)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/security/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let tokens = manager(&server);
        assert_eq!(tokens.token().await.unwrap(), "tok-old");

        let err = tokens.token().await.unwrap_err();
        assert!(err.is(codes::EXTERNAL_SERVICE_ERROR));
        assert_eq!(err.details["upstream_status"], 401);
        assert!(tokens.remaining().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/security/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok", 1799)))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        tokens.token().await.unwrap();
        tokens.invalidate();
        assert!(tokens.remaining().is_none());
        tokens.token().await.unwrap();
    }
}
