use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use axum_extra::TypedHeader;
use chrono::{Datelike, Duration, Utc};
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::*;
use appointment_cell::models::*;
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

fn appointment_row(
    id: Uuid,
    owner_id: Uuid,
    pet_id: Uuid,
    provider_id: Uuid,
    start: chrono::DateTime<Utc>,
    status: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "owner_id": owner_id,
        "pet_id": pet_id,
        "provider_id": provider_id,
        "referral_id": null,
        "scheduled_start_time": start.to_rfc3339(),
        "scheduled_end_time": (start + Duration::minutes(60)).to_rfc3339(),
        "status": status,
        "visit_type": "wellness_exam",
        "visit_address": "12 Elm St",
        "visit_lat": null,
        "visit_lng": null,
        "owner_notes": null,
        "provider_notes": null,
        "cancellation_reason": null,
        "cancelled_by": null,
        "actual_start_time": null,
        "actual_end_time": null,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

fn provider_profile_row(provider_id: Uuid, active: bool, verified: bool) -> serde_json::Value {
    json!({
        "id": provider_id,
        "user_id": Uuid::new_v4(),
        "display_name": "Dr. Reyes",
        "specialties": ["general_practice"],
        "bio": "Mobile vet",
        "license_number": "VET-204871",
        "years_of_experience": 8,
        "home_base_lat": null,
        "home_base_lng": null,
        "service_radius_km": null,
        "is_active": active,
        "is_verified": verified,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

/// A start time one week out at 10:00 UTC, so the matching recurring rule can
/// be derived from its weekday.
fn next_week_at_ten() -> chrono::DateTime<Utc> {
    let date = (Utc::now() + Duration::days(7)).date_naive();
    date.and_hms_opt(10, 0, 0).expect("valid time").and_utc()
}

async fn mount_booking_mocks(setup: &TestSetup, owner_id: Uuid, pet_id: Uuid, provider_id: Uuid) {
    let start = next_week_at_ten();
    let weekday = start.date_naive().weekday().num_days_from_sunday();

    Mock::given(method("GET"))
        .and(path("/rest/v1/pets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": pet_id,
            "owner_id": owner_id,
            "name": "Biscuit"
        })]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![provider_profile_row(provider_id, true, true)]),
        )
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "day_of_week": weekday,
            "start_time": "08:00:00",
            "end_time": "18:00:00",
            "slot_minutes": 60,
            "buffer_minutes": 15,
            "is_recurring": true,
            "specific_date": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&setup.mock_server)
        .await;

    // No existing bookings that day
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![appointment_row(
            Uuid::new_v4(),
            owner_id,
            pet_id,
            provider_id,
            start,
            "pending",
        )]))
        .mount(&setup.mock_server)
        .await;

    // Notification insert is best-effort; accept and discard
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&setup.mock_server)
        .await;
}

#[tokio::test]
async fn owner_books_appointment_inside_availability() {
    let setup = TestSetup::new().await;
    let owner = TestUser::pet_owner("owner@example.com");
    let owner_id: Uuid = owner.id.parse().expect("uuid");
    let pet_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

    mount_booking_mocks(&setup, owner_id, pet_id, provider_id).await;

    let request = BookAppointmentRequest {
        owner_id,
        pet_id,
        provider_id,
        referral_id: None,
        start_time: next_week_at_ten(),
        duration_minutes: 60,
        visit_type: VisitType::WellnessExam,
        visit_address: "12 Elm St".to_string(),
        visit_lat: None,
        visit_lng: None,
        owner_notes: Some("First visit".to_string()),
    };

    let result = book_appointment(
        State(setup.state.clone()),
        setup.auth_for(&owner),
        extension_for(&owner),
        Json(request),
    )
    .await;

    let Json(body) = result.expect("booking should succeed");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["appointment"]["status"], json!("pending"));
}

#[tokio::test]
async fn owner_cannot_book_for_someone_else() {
    let setup = TestSetup::new().await;
    let owner = TestUser::pet_owner("owner@example.com");

    let request = BookAppointmentRequest {
        owner_id: Uuid::new_v4(), // not the caller
        pet_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        referral_id: None,
        start_time: next_week_at_ten(),
        duration_minutes: 60,
        visit_type: VisitType::WellnessExam,
        visit_address: "12 Elm St".to_string(),
        visit_lat: None,
        visit_lng: None,
        owner_notes: None,
    };

    let result = book_appointment(
        State(setup.state.clone()),
        setup.auth_for(&owner),
        extension_for(&owner),
        Json(request),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn unverified_provider_cannot_be_booked() {
    let setup = TestSetup::new().await;
    let owner = TestUser::pet_owner("owner@example.com");
    let owner_id: Uuid = owner.id.parse().expect("uuid");
    let pet_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/pets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": pet_id,
            "owner_id": owner_id,
            "name": "Biscuit"
        })]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![provider_profile_row(provider_id, true, false)]),
        )
        .mount(&setup.mock_server)
        .await;

    let request = BookAppointmentRequest {
        owner_id,
        pet_id,
        provider_id,
        referral_id: None,
        start_time: next_week_at_ten(),
        duration_minutes: 60,
        visit_type: VisitType::SickVisit,
        visit_address: "12 Elm St".to_string(),
        visit_lat: None,
        visit_lng: None,
        owner_notes: None,
    };

    let result = book_appointment(
        State(setup.state.clone()),
        setup.auth_for(&owner),
        extension_for(&owner),
        Json(request),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn confirming_a_completed_appointment_conflicts() {
    let setup = TestSetup::new().await;
    let provider = TestUser::provider("vet@example.com");
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() - Duration::hours(2),
            "completed",
        )]))
        .mount(&setup.mock_server)
        .await;

    let result = confirm_appointment(
        State(setup.state.clone()),
        setup.auth_for(&provider),
        extension_for(&provider),
        Path(appointment_id),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn rescheduling_a_completed_appointment_names_the_attempted_target() {
    let setup = TestSetup::new().await;
    let provider = TestUser::provider("vet@example.com");
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() - Duration::hours(2),
            "completed",
        )]))
        .mount(&setup.mock_server)
        .await;

    let request = RescheduleAppointmentRequest {
        new_start_time: next_week_at_ten(),
        new_duration_minutes: None,
        reason: None,
    };

    let result = reschedule_appointment(
        State(setup.state.clone()),
        setup.auth_for(&provider),
        extension_for(&provider),
        Path(appointment_id),
        Json(request),
    )
    .await;

    match result {
        Err(AppError::Conflict(msg)) => {
            assert!(msg.contains("from completed to pending"), "got: {}", msg);
        }
        other => panic!("expected a conflict, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn search_scopes_pet_owners_to_their_own_bookings() {
    let setup = TestSetup::new().await;
    let owner = TestUser::pet_owner("owner@example.com");
    let owner_id: Uuid = owner.id.parse().expect("uuid");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(wiremock::matchers::query_param(
            "owner_id",
            format!("eq.{}", owner_id),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            Uuid::new_v4(),
            owner_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() + Duration::days(1),
            "confirmed",
        )]))
        .mount(&setup.mock_server)
        .await;

    let query = AppointmentSearchQuery {
        owner_id: None, // handler must pin this to the caller
        provider_id: None,
        pet_id: None,
        status: None,
        visit_type: None,
        from_date: None,
        to_date: None,
        limit: None,
        offset: None,
    };

    let result = search_appointments(
        State(setup.state.clone()),
        setup.auth_for(&owner),
        extension_for(&owner),
        Query(query),
    )
    .await;

    let Json(body) = result.expect("search should succeed");
    assert_eq!(body["count"], json!(1));
    assert_eq!(body["appointments"][0]["owner_id"], json!(owner_id));
}
