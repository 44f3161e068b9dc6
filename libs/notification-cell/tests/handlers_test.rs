use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::handlers::*;
use notification_cell::models::*;
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

fn notification_row(recipient_id: Uuid, kind: &str, read: bool) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "recipient_id": recipient_id,
        "kind": kind,
        "title": "Upcoming appointment",
        "body": "You have an appointment coming up.",
        "related_entity_id": Uuid::new_v4(),
        "is_read": read,
        "created_at": Utc::now().to_rfc3339()
    })
}

#[tokio::test]
async fn listing_is_pinned_to_the_caller() {
    let setup = TestSetup::new().await;
    let owner = TestUser::pet_owner("owner@example.com");
    let owner_id: Uuid = owner.id.parse().expect("uuid");

    // The recipient filter must carry the caller's id, whatever was asked for
    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("recipient_id", format!("eq.{}", owner_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            notification_row(owner_id, "appointment_confirmed", false),
            notification_row(owner_id, "appointment_reminder", true),
        ]))
        .mount(&setup.mock_server)
        .await;

    let query = NotificationListQuery {
        unread_only: None,
        limit: None,
    };

    let result = list_notifications(
        State(setup.state.clone()),
        setup.auth_for(&owner),
        extension_for(&owner),
        Query(query),
    )
    .await;

    let Json(body) = result.expect("list should load");
    assert_eq!(body["notifications"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(body["unread_count"], json!(1));
}

#[tokio::test]
async fn marking_read_is_scoped_to_the_recipient() {
    let setup = TestSetup::new().await;
    let owner = TestUser::pet_owner("owner@example.com");

    // PostgREST matches nothing when the row belongs to someone else
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&setup.mock_server)
        .await;

    let result = mark_read(
        State(setup.state.clone()),
        setup.auth_for(&owner),
        extension_for(&owner),
        Path(Uuid::new_v4()),
    )
    .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn reminder_sweep_counts_each_upcoming_visit() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");
    let owner_id = Uuid::new_v4();

    let upcoming = |hours: i64| {
        json!({
            "id": Uuid::new_v4(),
            "owner_id": owner_id,
            "scheduled_start_time": (Utc::now() + Duration::hours(hours)).to_rfc3339()
        })
    };

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![upcoming(3), upcoming(20)]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![notification_row(
            owner_id,
            "appointment_reminder",
            false,
        )]))
        .mount(&setup.mock_server)
        .await;

    // Contact lookup failing must not block the reminder write
    Mock::given(method("GET"))
        .and(path("/rest/v1/accounts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&setup.mock_server)
        .await;

    let result = run_reminder_sweep(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Query(ReminderSweepQuery { hours_ahead: None }),
    )
    .await;

    let Json(body) = result.expect("sweep should run");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["reminders_sent"], json!(2));
}

#[tokio::test]
async fn record_dispatches_email_and_sms_to_known_contacts() {
    let mock_server = MockServer::start().await;
    let config = AppConfig {
        supabase_url: mock_server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
        messaging_api_base_url: mock_server.uri(),
        messaging_api_token: "test-messaging-token".to_string(),
        messaging_sender: "no-reply@test.local".to_string(),
    };
    let recipient = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![notification_row(
            recipient,
            "appointment_confirmed",
            false,
        )]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "user_id": recipient,
            "email": "owner@example.com",
            "phone": "+15551234567"
        })]))
        .mount(&mock_server)
        .await;

    // One email and one SMS land on the messaging API
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-1"})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = notification_cell::services::notify::NotificationService::new(&config);
    let notification = service
        .record(
            recipient,
            NotificationKind::AppointmentConfirmed,
            "Appointment confirmed",
            "Your provider has confirmed the visit.",
            None,
            "test-token",
        )
        .await
        .expect("record should succeed");

    assert_eq!(notification.recipient_id, recipient);
    mock_server.verify().await;
}

#[tokio::test]
async fn reminder_sweep_is_admin_only() {
    let setup = TestSetup::new().await;
    let provider = TestUser::provider("vet@example.com");

    let result = run_reminder_sweep(
        State(setup.state.clone()),
        setup.auth_for(&provider),
        extension_for(&provider),
        Query(ReminderSweepQuery {
            hours_ahead: Some(4),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}
