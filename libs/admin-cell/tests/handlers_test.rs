use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use admin_cell::handlers::*;
use admin_cell::models::*;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestSetup {
    state: Arc<AppConfig>,
    mock_server: MockServer,
    jwt_secret: String,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;
        let config = TestConfig {
            supabase_url: mock_server.uri(),
            ..TestConfig::default()
        };
        let jwt_secret = config.jwt_secret.clone();
        Self {
            state: config.to_arc(),
            mock_server,
            jwt_secret,
        }
    }

    fn auth_for(&self, user: &TestUser) -> TypedHeader<Authorization<Bearer>> {
        let token = JwtTestUtils::create_test_token(user, &self.jwt_secret, Some(1));
        TypedHeader(Authorization::bearer(&token).expect("valid bearer token"))
    }
}

fn extension_for(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

#[tokio::test]
async fn every_admin_route_rejects_non_admins() {
    let setup = TestSetup::new().await;
    let clinic = TestUser::clinic("clinic@example.com");
    let user_id = Uuid::new_v4();

    let suspend = suspend_user(
        State(setup.state.clone()),
        setup.auth_for(&clinic),
        extension_for(&clinic),
        Path(user_id),
        Json(ModerationRequest {
            reason: "spam".to_string(),
        }),
    )
    .await;
    assert!(matches!(suspend, Err(AppError::Forbidden(_))));

    let funnel = referral_funnel(
        State(setup.state.clone()),
        setup.auth_for(&clinic),
        extension_for(&clinic),
        Query(DateRangeQuery {
            from_date: None,
            to_date: None,
        }),
    )
    .await;
    assert!(matches!(funnel, Err(AppError::Forbidden(_))));

    let anomalies = booking_anomalies(
        State(setup.state.clone()),
        setup.auth_for(&clinic),
        extension_for(&clinic),
        Query(AnomalyQuery { window_days: None }),
    )
    .await;
    assert!(matches!(anomalies, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn suspending_a_user_writes_an_audit_record() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");
    let user_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "user_id": user_id,
            "email": "target@example.com",
            "is_suspended": false
        })]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/moderation_actions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![json!({
            "id": Uuid::new_v4(),
            "user_id": user_id,
            "action": "suspend",
            "reason": "repeated no-shows as provider",
            "actor_id": admin.id,
            "created_at": Utc::now().to_rfc3339()
        })]))
        .mount(&setup.mock_server)
        .await;

    let result = suspend_user(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Path(user_id),
        Json(ModerationRequest {
            reason: "repeated no-shows as provider".to_string(),
        }),
    )
    .await;

    let Json(body) = result.expect("suspension should succeed");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["record"]["action"], json!("suspend"));
}

#[tokio::test]
async fn suspending_twice_conflicts() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");
    let user_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "user_id": user_id,
            "email": "target@example.com",
            "is_suspended": true
        })]))
        .mount(&setup.mock_server)
        .await;

    let result = suspend_user(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Path(user_id),
        Json(ModerationRequest {
            reason: "still spamming".to_string(),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn referral_funnel_counts_cumulative_stages() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/referrals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            json!({"status": "pending"}),
            json!({"status": "accepted"}),
            json!({"status": "scheduled"}),
            json!({"status": "completed"}),
            json!({"status": "cancelled"}),
        ]))
        .mount(&setup.mock_server)
        .await;

    let result = referral_funnel(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Query(DateRangeQuery {
            from_date: None,
            to_date: None,
        }),
    )
    .await;

    let Json(body) = result.expect("funnel should load");
    assert_eq!(body["funnel"]["created"], json!(5));
    assert_eq!(body["funnel"]["accepted"], json!(3));
    assert_eq!(body["funnel"]["scheduled"], json!(2));
    assert_eq!(body["funnel"]["completed"], json!(1));
}

#[tokio::test]
async fn anomaly_report_covers_the_requested_window() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            json!({"created_at": Utc::now().to_rfc3339(), "updated_at": Utc::now().to_rfc3339()}),
        ]))
        .mount(&setup.mock_server)
        .await;

    let result = booking_anomalies(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Query(AnomalyQuery {
            window_days: Some(14),
        }),
    )
    .await;

    let Json(body) = result.expect("report should load");
    assert_eq!(body["report"]["window_days"], json!(14));
}
