use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use referral_cell::handlers::*;
use referral_cell::models::*;
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

fn referral_row(
    id: Uuid,
    clinic_id: Uuid,
    provider_id: Option<Uuid>,
    status: &str,
    candidates: serde_json::Value,
    declined: serde_json::Value,
) -> serde_json::Value {
    json!({
        "id": id,
        "clinic_id": clinic_id,
        "owner_id": Uuid::new_v4(),
        "pet_id": Uuid::new_v4(),
        "provider_id": provider_id,
        "required_specialty": "cardiology",
        "urgency": "high",
        "case_summary": "Grade III heart murmur, needs echo",
        "status": status,
        "candidates": candidates,
        "declined_provider_ids": declined,
        "appointment_id": null,
        "expires_at": (Utc::now() + Duration::hours(48)).to_rfc3339(),
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

fn candidate_json(provider_id: Uuid, rank: i32) -> serde_json::Value {
    json!({
        "provider_id": provider_id,
        "rank": rank,
        "prior_completed_with_owner": 0,
        "years_of_experience": 8
    })
}

fn provider_profile_row(provider_id: Uuid, user_id: &str) -> serde_json::Value {
    json!({
        "id": provider_id,
        "user_id": user_id,
        "display_name": "Dr. Osei",
        "specialties": ["cardiology"],
        "bio": "Cardiology referrals",
        "license_number": "VET-551234",
        "years_of_experience": 8,
        "home_base_lat": null,
        "home_base_lng": null,
        "service_radius_km": null,
        "is_active": true,
        "is_verified": true,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

#[tokio::test]
async fn only_clinics_create_referrals() {
    let setup = TestSetup::new().await;
    let owner = TestUser::pet_owner("owner@example.com");

    let request = CreateReferralRequest {
        owner_id: Uuid::new_v4(),
        pet_id: Uuid::new_v4(),
        required_specialty: "cardiology".to_string(),
        urgency: ReferralUrgency::High,
        case_summary: "Murmur".to_string(),
        expires_in_hours: None,
    };

    let result = create_referral(
        State(setup.state.clone()),
        setup.auth_for(&owner),
        extension_for(&owner),
        Json(request),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn candidate_provider_accepts_a_pending_referral() {
    let setup = TestSetup::new().await;
    let provider_user = TestUser::provider("vet@example.com");
    let provider_id = Uuid::new_v4();
    let referral_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![provider_profile_row(
            provider_id,
            &provider_user.id,
        )]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/referrals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![referral_row(
            referral_id,
            clinic_id,
            None,
            "pending",
            json!([candidate_json(provider_id, 1)]),
            json!([]),
        )]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/referrals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![referral_row(
            referral_id,
            clinic_id,
            Some(provider_id),
            "accepted",
            json!([candidate_json(provider_id, 1)]),
            json!([]),
        )]))
        .mount(&setup.mock_server)
        .await;

    let result = accept_referral(
        State(setup.state.clone()),
        setup.auth_for(&provider_user),
        extension_for(&provider_user),
        Path(referral_id),
    )
    .await;

    let Json(body) = result.expect("accept should succeed");
    assert_eq!(body["referral"]["status"], json!("accepted"));
    assert_eq!(body["referral"]["provider_id"], json!(provider_id));
}

#[tokio::test]
async fn outsider_provider_cannot_accept() {
    let setup = TestSetup::new().await;
    let provider_user = TestUser::provider("other-vet@example.com");
    let outsider_id = Uuid::new_v4();
    let referral_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![provider_profile_row(
            outsider_id,
            &provider_user.id,
        )]))
        .mount(&setup.mock_server)
        .await;

    // Candidate list names a different provider
    Mock::given(method("GET"))
        .and(path("/rest/v1/referrals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![referral_row(
            referral_id,
            Uuid::new_v4(),
            None,
            "pending",
            json!([candidate_json(Uuid::new_v4(), 1)]),
            json!([]),
        )]))
        .mount(&setup.mock_server)
        .await;

    let result = accept_referral(
        State(setup.state.clone()),
        setup.auth_for(&provider_user),
        extension_for(&provider_user),
        Path(referral_id),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn last_decline_moves_referral_to_unassigned() {
    let setup = TestSetup::new().await;
    let provider_user = TestUser::provider("vet@example.com");
    let provider_id = Uuid::new_v4();
    let referral_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![provider_profile_row(
            provider_id,
            &provider_user.id,
        )]))
        .mount(&setup.mock_server)
        .await;

    // Sole candidate declining empties the pool
    Mock::given(method("GET"))
        .and(path("/rest/v1/referrals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![referral_row(
            referral_id,
            clinic_id,
            None,
            "pending",
            json!([candidate_json(provider_id, 1)]),
            json!([]),
        )]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/referrals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![referral_row(
            referral_id,
            clinic_id,
            None,
            "unassigned",
            json!([candidate_json(provider_id, 1)]),
            json!([provider_id]),
        )]))
        .mount(&setup.mock_server)
        .await;

    let result = decline_referral(
        State(setup.state.clone()),
        setup.auth_for(&provider_user),
        extension_for(&provider_user),
        Path(referral_id),
        Json(DeclineReferralRequest { reason: None }),
    )
    .await;

    let Json(body) = result.expect("decline should succeed");
    assert_eq!(body["referral"]["status"], json!("unassigned"));
}

#[tokio::test]
async fn completed_referral_cannot_be_cancelled() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");
    let referral_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/referrals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![referral_row(
            referral_id,
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            "completed",
            json!([]),
            json!([]),
        )]))
        .mount(&setup.mock_server)
        .await;

    let result = cancel_referral(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Path(referral_id),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}
