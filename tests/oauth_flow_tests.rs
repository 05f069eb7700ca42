//! Integration tests for the OAuth token lifecycle against a mock token endpoint
//!
//! Each test starts its own wiremock server standing in for
//! `services.leadconnectorhq.com`, so the exact number of requests reaching
//! the provider can be asserted with `.expect(n)`.

use highlevel_sdk::auth::{
    AccountContext, CallbackHandler, FileTokenStore, MemoryTokenStore, TokenManager,
    TokenRefresher, TokenSet, TokenStore, UserType,
};
use highlevel_sdk::{ClientCredentials, HighLevelError, OAuthConfig, RetryPolicy};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Fixtures
// ============================================================================

fn credentials() -> ClientCredentials {
    ClientCredentials::new(
        "client-1",
        "secret-1",
        "http://localhost:3000/oauth/callback",
        ["conversations/message.readonly", "contacts.readonly"],
    )
}

/// Route SDK logs to the test output (`RUST_LOG=highlevel_sdk=debug`)
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(server: &MockServer) -> OAuthConfig {
    init_tracing();
    OAuthConfig::builder()
        .token_url(format!("{}/oauth/token", server.uri()))
        .api_base_url(server.uri())
        .timeout(Duration::from_secs(5))
        .retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        })
        .build()
}

fn token_body(access: &str, refresh: &str, location: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": 86399,
        "refresh_token": refresh,
        "scope": "conversations/message.readonly",
        "userType": "Location",
        "locationId": location,
        "companyId": "comp1",
        "hashedCompanyId": "hash1"
    })
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A token set about to expire (inside the default refresh margin)
fn stale_token() -> TokenSet {
    let mut body = token_body("old-access", "ref1", "loc1");
    body["expires_in"] = json!(60);
    TokenSet::from_response(&body.to_string(), now()).unwrap()
}

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

// ============================================================================
// Code exchange
// ============================================================================

#[tokio::test]
async fn test_code_exchange_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .and(body_string_contains("client_id=client-1"))
        .and(body_string_contains("client_secret=secret-1"))
        .and(body_string_contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Foauth%2Fcallback",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"access_token":"tok1","token_type":"Bearer","expires_in":86399,"refresh_token":"ref1","scope":"conversations/message.readonly","userType":"Location","locationId":"loc1","companyId":"loc1","hashedCompanyId":"hash1"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let handler = CallbackHandler::new(credentials(), &config(&server)).unwrap();
    let token = handler.exchange_code("abc123").await.unwrap();

    assert_eq!(token.access_token, "tok1");
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.expires_in, 86399);
    assert_eq!(token.refresh_token, "ref1");
    assert_eq!(token.scope, "conversations/message.readonly");
    assert_eq!(token.user_type, UserType::Location);
    assert_eq!(token.location_id.as_deref(), Some("loc1"));
    assert_eq!(token.company_id, "loc1");
    assert_eq!(token.hashed_company_id, "hash1");
    assert!(!token.is_expired());
}

#[tokio::test]
async fn test_code_exchange_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Authorization code expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handler = CallbackHandler::new(credentials(), &config(&server)).unwrap();
    let err = handler.handle_redirect("?code=stale").await.unwrap_err();

    match err {
        HighLevelError::Authorization(provider) => {
            assert_eq!(provider.status, 400);
            assert_eq!(provider.error, "invalid_grant");
            assert_eq!(
                provider.error_description.as_deref(),
                Some("Authorization code expired")
            );
            assert!(provider.body.contains("invalid_grant"));
        }
        other => panic!("expected Authorization, got {other:?}"),
    }
}

#[tokio::test]
async fn test_code_exchange_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let handler = CallbackHandler::new(credentials(), &config(&server)).unwrap();
    let err = handler.exchange_code("abc123").await.unwrap_err();

    assert!(matches!(err, HighLevelError::Api(ref api) if api.status == 503));
}

#[tokio::test]
async fn test_code_exchange_timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("tok1", "ref1", "loc1"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let config = OAuthConfig::builder()
        .token_url(format!("{}/oauth/token", server.uri()))
        .timeout(Duration::from_millis(200))
        .build();
    let handler = CallbackHandler::new(credentials(), &config).unwrap();
    let err = handler.exchange_code("abc123").await.unwrap_err();

    assert!(matches!(err, HighLevelError::Transport(ref e) if e.is_timeout()));
}

#[tokio::test]
async fn test_redirect_to_file_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok1", "ref1", "loc1")))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = FileTokenStore::with_path(temp_dir.path().join("token.json"));

    let handler = CallbackHandler::new(credentials(), &config(&server)).unwrap();
    let token = handler
        .handle_redirect("http://localhost:3000/oauth/callback?code=abc123")
        .await
        .unwrap();
    store.save(&token).await.unwrap();

    let loaded = store.get_current().await.unwrap().unwrap();
    assert_eq!(loaded, token);
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_invalid_grant_requires_reauthorization() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_grant"}"#),
        1,
    )
    .await;

    let refresher = TokenRefresher::new(credentials(), &config(&server)).unwrap();
    let err = refresher.refresh_with_retry("revoked").await.unwrap_err();

    match &err {
        HighLevelError::ReauthorizationRequired(provider) => {
            assert_eq!(provider.message(), "invalid_grant");
        }
        other => panic!("expected ReauthorizationRequired, got {other:?}"),
    }
    assert!(err.to_string().contains("invalid_grant"));
    assert!(err.requires_reauthorization());
}

#[tokio::test]
async fn test_concurrent_refresh_sends_one_request() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(token_body("tok2", "ref2", "loc1"))
            .set_delay(Duration::from_millis(200)),
        1,
    )
    .await;

    let refresher = TokenRefresher::new(credentials(), &config(&server)).unwrap();
    let (first, second) = tokio::join!(refresher.refresh("ref1"), refresher.refresh("ref1"));

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.access_token, "tok2");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_refresh_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(token_body("tok2", "ref2", "loc1")),
        1,
    )
    .await;

    let refresher = TokenRefresher::new(credentials(), &config(&server)).unwrap();
    let token = refresher.refresh_with_retry("ref1").await.unwrap();
    assert_eq!(token.access_token, "tok2");
}

#[tokio::test]
async fn test_refresh_backs_off_when_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"message": "Too Many Requests"})),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(token_body("tok2", "ref2", "loc1")),
        1,
    )
    .await;

    let refresher = TokenRefresher::new(credentials(), &config(&server)).unwrap();
    let token = refresher.refresh_with_retry("ref1").await.unwrap();
    assert_eq!(token.access_token, "tok2");
}

#[tokio::test]
async fn test_rate_limited_refresh_is_not_remembered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(token_body("tok2", "ref2", "loc1")),
        1,
    )
    .await;

    let config = OAuthConfig::builder()
        .token_url(format!("{}/oauth/token", server.uri()))
        .retry(RetryPolicy::none())
        .build();
    let refresher = TokenRefresher::new(credentials(), &config).unwrap();

    let err = refresher.refresh_with_retry("ref1").await.unwrap_err();
    assert!(matches!(&err, HighLevelError::Api(api) if api.status == 429));
    assert!(err.is_retryable());
    assert!(!err.requires_reauthorization());

    let token = refresher.refresh_with_retry("ref1").await.unwrap();
    assert_eq!(token.access_token, "tok2");
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    let mut body = token_body("tok2", "", "loc1");
    body.as_object_mut().unwrap().remove("refresh_token");
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(body), 1).await;

    let refresher = TokenRefresher::new(credentials(), &config(&server)).unwrap();
    let token = refresher.refresh("ref1").await.unwrap();
    assert_eq!(token.refresh_token, "ref1");
}

// ============================================================================
// Token manager
// ============================================================================

fn manager(server: &MockServer, store: Arc<dyn TokenStore>) -> Arc<TokenManager> {
    let config = config(server);
    let refresher = TokenRefresher::new(credentials(), &config).unwrap();
    Arc::new(TokenManager::new(store, refresher, config.refresh_margin))
}

#[tokio::test]
async fn test_manager_refreshes_stale_token_once() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(token_body("tok2", "ref2", "loc1"))
            .set_delay(Duration::from_millis(100)),
        1,
    )
    .await;

    let store = Arc::new(MemoryTokenStore::with_token(stale_token()));
    let manager = manager(&server, store.clone());

    let (a, b, c) = tokio::join!(
        manager.valid_token(),
        manager.valid_token(),
        manager.valid_token()
    );
    for token in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert_eq!(token.access_token, "tok2");
    }

    let stored = store.get_current().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "tok2");
    assert_eq!(stored.refresh_token, "ref2");
}

#[tokio::test]
async fn test_manager_refreshes_non_rotating_token_every_time() {
    let server = MockServer::start().await;
    // Provider keeps the refresh token and issues short-lived access tokens
    let mut body = token_body("tok2", "", "loc1");
    body.as_object_mut().unwrap().remove("refresh_token");
    body["expires_in"] = json!(200);
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(body), 3).await;

    let store = Arc::new(MemoryTokenStore::with_token(stale_token()));
    let manager = manager(&server, store.clone());

    // Each result is still inside the refresh margin, so every call refreshes
    let first = manager.valid_token().await.unwrap();
    let second = manager.valid_token().await.unwrap();
    let forced = manager.force_refresh().await.unwrap();

    for token in [first, second, forced] {
        assert_eq!(token.access_token, "tok2");
        assert_eq!(token.refresh_token, "ref1");
    }
    let stored = store.get_current().await.unwrap().unwrap();
    assert_eq!(stored.refresh_token, "ref1");
}

#[tokio::test]
async fn test_manager_force_refresh_calls_provider_each_time() {
    let server = MockServer::start().await;
    let mut body = token_body("tok2", "", "loc1");
    body.as_object_mut().unwrap().remove("refresh_token");
    mount_refresh(&server, ResponseTemplate::new(200).set_body_json(body), 2).await;

    let store = Arc::new(MemoryTokenStore::with_token(stale_token()));
    let manager = manager(&server, store);

    manager.force_refresh().await.unwrap();
    manager.force_refresh().await.unwrap();
}

#[tokio::test]
async fn test_manager_rejects_refresh_for_other_account() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(token_body("tok2", "ref2", "loc2")),
        1,
    )
    .await;

    let store = Arc::new(MemoryTokenStore::with_token(stale_token()));
    let manager = manager(&server, store.clone());

    let err = manager.valid_token().await.unwrap_err();
    assert!(matches!(err, HighLevelError::AccountMismatch { .. }));

    let stored = store.get_current().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "old-access");
    assert_eq!(stored.account(), AccountContext::Location("loc1".to_string()));
}

#[tokio::test]
async fn test_manager_surfaces_reauthorization() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        1,
    )
    .await;

    let store = Arc::new(MemoryTokenStore::with_token(stale_token()));
    let manager = manager(&server, store);

    let err = manager.force_refresh().await.unwrap_err();
    assert!(matches!(err, HighLevelError::ReauthorizationRequired(_)));
}
