//! End-to-end tests of the request pipeline against a mock backend.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use meethub_core::{
    ApiClient, ApiError, ApiRequest, CurrentUser, GuardDecision, ManualClock, RouteGuard, Role,
    SessionEvent, Tokens,
};
use serde_json::json;
use tokio::sync::broadcast::Receiver;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user(role: Role) -> CurrentUser {
    CurrentUser {
        id: "u-1".to_string(),
        display_name: "Dana".to_string(),
        email: "dana@example.com".to_string(),
        role,
    }
}

fn tokens(access: &str, refresh: &str) -> Tokens {
    Tokens {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        expires_in: 900,
    }
}

fn client(server: &MockServer, clock: Arc<ManualClock>) -> ApiClient {
    ApiClient::builder(format!("{}/api", server.uri()))
        .clock(clock)
        .build()
        .expect("client should build")
}

/// Client with a stored session using access token `t1` and refresh token `r1`
fn signed_in_client(server: &MockServer, clock: Arc<ManualClock>) -> ApiClient {
    let client = client(server, clock);
    client
        .tokens()
        .set_session(&tokens("t1", "r1"), &user(Role::Member))
        .unwrap();
    client
}

fn refresh_ok(access: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": {
            "tokens": {"accessToken": access, "refreshToken": "r2", "expiresIn": 900}
        }
    }))
}

fn drain(events: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn requests_to(server: &MockServer, url_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == url_path)
        .count()
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refreshToken": "r1"})))
        .respond_with(refresh_ok("t2").set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/meetings"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/meetings"))
        .and(header("authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    let mut events = client.events().subscribe();

    let requests = (0..5).map(|page| {
        let client = client.clone();
        async move {
            client
                .send(ApiRequest::get("meetings").query("page", page.to_string()))
                .await
        }
    });
    let results = join_all(requests).await;

    for result in results {
        let response = result.expect("request should succeed after refresh");
        assert!(!response.from_cache);
        assert!(response.body.contains("\"id\""));
    }
    assert_eq!(requests_to(&server, "/api/auth/refresh").await, 1);
    assert_eq!(client.tokens().access_token().as_deref(), Some("t2"));
    assert_eq!(client.tokens().refresh_token().as_deref(), Some("r2"));
    assert!(!client.refresh_coordinator().is_refreshing());
    assert_eq!(drain(&mut events), vec![SessionEvent::TokensRefreshed]);
}

#[tokio::test]
async fn test_401_after_completed_refresh_reuses_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refresh_ok("t2"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .and(header("authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    client.send(ApiRequest::get("tasks")).await.unwrap();

    // A request that went out with t1 before the refresh finished
    let token = client
        .refresh_coordinator()
        .fresh_access_token(Some("t1"))
        .await
        .unwrap();
    assert_eq!(token, "t2");
    assert_eq!(requests_to(&server, "/api/auth/refresh").await, 1);
}

#[tokio::test]
async fn test_second_401_is_not_retried_again() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refresh_ok("t2"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/admin/users"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    let result = client.send(ApiRequest::get("admin/users")).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_refresh_failure_ends_session_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"success": false, "message": "Refresh token expired"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    let mut events = client.events().subscribe();

    let requests = (0..3).map(|page| {
        let client = client.clone();
        async move {
            client
                .send(ApiRequest::get("projects").query("page", page.to_string()))
                .await
        }
    });
    for result in join_all(requests).await {
        let error = result.expect_err("refresh failure must fail the request");
        assert!(matches!(error, ApiError::SessionExpired(_)));
        assert!(error.requires_login());
    }

    assert!(!client.is_authenticated());
    assert!(client.current_user().is_none());
    assert_eq!(
        RouteGuard::default().check("/projects", client.tokens()),
        GuardDecision::RedirectToLogin("/login".to_string())
    );

    let expired = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::SessionExpired { .. }))
        .count();
    assert_eq!(expired, 1);
}

#[tokio::test]
async fn test_get_cached_for_five_minutes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::starting_now());
    let client = signed_in_client(&server, clock.clone());

    let first = client
        .send(ApiRequest::get("projects?status=active&owner=me"))
        .await
        .unwrap();
    assert!(!first.from_cache);

    clock.advance(Duration::from_secs(4 * 60));
    let second = client
        .send(ApiRequest::get("projects?status=active&owner=me"))
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(second.body, first.body);
    assert_eq!(requests_to(&server, "/api/projects").await, 1);

    // 5 minutes and 1 millisecond after the first response was stored
    clock.advance(Duration::from_secs(60) + Duration::from_millis(1));
    let third = client
        .send(ApiRequest::get("projects?status=active&owner=me"))
        .await
        .unwrap();
    assert!(!third.from_cache);
    assert_eq!(requests_to(&server, "/api/projects").await, 2);
}

#[tokio::test]
async fn test_cache_ignores_param_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    client
        .send(ApiRequest::get("projects").query("status", "active").query("owner", "me"))
        .await
        .unwrap();
    let again = client
        .send(ApiRequest::get("projects").query("owner", "me").query("status", "active"))
        .await
        .unwrap();

    assert!(again.from_cache);
    assert_eq!(client.cached_response_count(), 1);
}

#[tokio::test]
async fn test_errors_and_writes_are_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such project"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/meetings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 3})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refresh_ok("t2"))
        .expect(0)
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    for _ in 0..2 {
        let result = client.send(ApiRequest::get("projects/9")).await;
        assert!(matches!(result, Err(ApiError::NotFound(body)) if body == "no such project"));
    }

    let body = json!({"title": "Kickoff"});
    for _ in 0..2 {
        let created: serde_json::Value = client.post_json("meetings", &body).await.unwrap();
        assert_eq!(created["id"], 3);
    }
    assert_eq!(client.cached_response_count(), 0);
}

#[tokio::test]
async fn test_server_error_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    let result = client.send(ApiRequest::get("tasks")).await;

    assert!(matches!(result, Err(ApiError::ServerError(body)) if body == "maintenance"));
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_login_starts_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"email": "dana@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "user": {"id": "u-1", "displayName": "Dana", "email": "dana@example.com", "role": "pm"},
                "tokens": {"accessToken": "t1", "refreshToken": "r1", "expiresIn": 900}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, Arc::new(ManualClock::starting_now()));
    let mut events = client.events().subscribe();
    assert!(!client.is_authenticated());

    let signed_in = client.login("dana@example.com", "hunter2").await.unwrap();

    assert_eq!(signed_in.role, Role::Pm);
    assert!(client.is_authenticated());
    assert_eq!(client.current_user().map(|u| u.role), Some(Role::Pm));
    assert_eq!(client.tokens().access_token().as_deref(), Some("t1"));
    assert!(RouteGuard::default().check("/pm/board", client.tokens()).is_allowed());
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::LoggedIn {
            user_id: "u-1".to_string()
        }]
    );

    let login = &server.received_requests().await.unwrap()[0];
    assert!(login.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_failed_login_bypasses_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"success": false, "message": "Invalid email or password"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refresh_ok("t2"))
        .expect(0)
        .mount(&server)
        .await;

    // A stored session must not leak a bearer token onto the login call
    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    let result = client.login("dana@example.com", "wrong").await;

    match result {
        Err(ApiError::Rejected { message, .. }) => assert_eq!(message, "Invalid email or password"),
        other => panic!("Expected Rejected, got {:?}", other),
    }
    let login = &server.received_requests().await.unwrap()[0];
    assert!(login.headers.get("authorization").is_none());
    assert_eq!(client.tokens().access_token().as_deref(), Some("t1"));
}

#[tokio::test]
async fn test_logout_clears_session_and_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    client.send(ApiRequest::get("profile")).await.unwrap();
    assert_eq!(client.cached_response_count(), 1);

    let mut events = client.events().subscribe();
    client.logout();

    assert!(!client.is_authenticated());
    assert_eq!(client.cached_response_count(), 0);
    assert_eq!(drain(&mut events), vec![SessionEvent::LoggedOut]);
}

#[tokio::test]
async fn test_app_config_cached_for_an_hour() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "appName": "Meethub",
            "videoProvider": "jitsi",
            "features": {"chat": true}
        })))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::starting_now());
    let client = client(&server, clock.clone());

    let config = client.app_config().await.unwrap();
    assert_eq!(config.app_name.as_deref(), Some("Meethub"));
    assert!(config.feature_enabled("chat"));

    clock.advance(Duration::from_secs(59 * 60));
    client.app_config().await.unwrap();
    assert_eq!(requests_to(&server, "/api/config").await, 1);

    clock.advance(Duration::from_secs(60) + Duration::from_millis(1));
    client.app_config().await.unwrap();
    assert_eq!(requests_to(&server, "/api/config").await, 2);
}

#[tokio::test]
async fn test_token_never_sent_to_other_origin() {
    let server = MockServer::start().await;
    let foreign = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(0)
        .mount(&foreign)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(refresh_ok("t2"))
        .expect(0)
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    let result = client
        .send(ApiRequest::get(format!("{}/collect", foreign.uri())))
        .await;

    assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    assert!(foreign
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .all(|r| r.headers.get("authorization").is_none()));
    assert_eq!(requests_to(&foreign, "/collect").await, 0);
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_forced_logout_drops_cached_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"salary": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = signed_in_client(&server, Arc::new(ManualClock::starting_now()));
    client.send(ApiRequest::get("profile")).await.unwrap();
    assert_eq!(client.cached_response_count(), 1);

    let result = client.send(ApiRequest::get("projects")).await;
    assert!(matches!(result, Err(ApiError::SessionExpired(_))));
    assert!(!client.is_authenticated());
    assert_eq!(client.cached_response_count(), 0);

    // Without a session the profile has to come from the backend, which refuses it
    let again = client.send(ApiRequest::get("profile")).await;
    assert!(matches!(again, Err(ApiError::SessionExpired(_))));
    assert_eq!(requests_to(&server, "/api/profile").await, 2);
}
