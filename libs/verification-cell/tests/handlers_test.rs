use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use axum_extra::TypedHeader;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, Utc};
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};
use verification_cell::handlers::*;
use verification_cell::models::*;

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

fn request_row(
    id: Uuid,
    provider_id: Uuid,
    status: &str,
    priority: &str,
    submitted_hours_ago: i64,
    reviewed: bool,
) -> serde_json::Value {
    let submitted_at = Utc::now() - Duration::hours(submitted_hours_ago);
    json!({
        "id": id,
        "provider_id": provider_id,
        "submitted_by": Uuid::new_v4(),
        "priority": priority,
        "status": status,
        "score": 85,
        "auto_review_recommended": true,
        "review_notes": null,
        "reviewed_at": if reviewed { Some(Utc::now().to_rfc3339()) } else { None },
        "reviewed_by": if reviewed { Some(Uuid::new_v4()) } else { None },
        "submitted_at": submitted_at.to_rfc3339(),
        "updated_at": submitted_at.to_rfc3339()
    })
}

fn profile_row(provider_id: Uuid) -> serde_json::Value {
    json!({
        "id": provider_id,
        "user_id": Uuid::new_v4(),
        "display_name": "Dr. Reyes",
        "specialties": ["cardiology"],
        "bio": "Mobile specialist",
        "license_number": "VET-204871",
        "years_of_experience": 12,
        "home_base_lat": 51.5,
        "home_base_lng": -0.1,
        "service_radius_km": 25.0,
        "is_active": true,
        "is_verified": false,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

#[tokio::test]
async fn provider_submits_documents_and_gets_scored_request() {
    let setup = TestSetup::new().await;
    let provider_user = TestUser::provider("vet@example.com");
    let provider_id = Uuid::new_v4();
    let request_id = Uuid::new_v4();

    // The caller owns this provider profile
    let mut profile = profile_row(provider_id);
    profile["user_id"] = json!(provider_user.id);
    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![profile]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/verification_requests"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![request_row(
            request_id,
            provider_id,
            "pending",
            "standard",
            0,
            false,
        )]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/storage/v1/object/verification-documents/.+"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "ok"})))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/verification_documents"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![json!({
            "id": Uuid::new_v4(),
            "request_id": request_id,
            "provider_id": provider_id,
            "doc_type": "veterinary_license",
            "file_url": format!("{}/storage/v1/object/public/verification-documents/x.pdf", setup.mock_server.uri()),
            "content_type": "application/pdf",
            "issued_at": null,
            "uploaded_at": Utc::now().to_rfc3339()
        })]))
        .mount(&setup.mock_server)
        .await;

    let request = SubmitVerificationRequest {
        provider_id,
        priority: None,
        documents: vec![DocumentUpload {
            doc_type: DocumentType::VeterinaryLicense,
            extension: "pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: BASE64.encode(b"fake pdf bytes"),
            issued_at: None,
        }],
    };

    let result = submit_verification(
        State(setup.state.clone()),
        setup.auth_for(&provider_user),
        extension_for(&provider_user),
        Json(request),
    )
    .await;

    let Json(body) = result.expect("submission should succeed");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["request"]["status"], json!("pending"));
}

#[tokio::test]
async fn failed_upload_rolls_back_the_request_row() {
    let setup = TestSetup::new().await;
    let provider_user = TestUser::provider("vet@example.com");
    let provider_id = Uuid::new_v4();
    let request_id = Uuid::new_v4();

    let mut profile = profile_row(provider_id);
    profile["user_id"] = json!(provider_user.id);
    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![profile]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/verification_requests"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![request_row(
            request_id,
            provider_id,
            "pending",
            "standard",
            0,
            false,
        )]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/storage/v1/object/verification-documents/.+"))
        .respond_with(ResponseTemplate::new(500).set_body_string("bucket unavailable"))
        .mount(&setup.mock_server)
        .await;

    // The pending row (and any documents that landed) must be removed again
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/verification_documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/verification_requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    let request = SubmitVerificationRequest {
        provider_id,
        priority: None,
        documents: vec![DocumentUpload {
            doc_type: DocumentType::VeterinaryLicense,
            extension: "pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: BASE64.encode(b"fake pdf bytes"),
            issued_at: None,
        }],
    };

    let result = submit_verification(
        State(setup.state.clone()),
        setup.auth_for(&provider_user),
        extension_for(&provider_user),
        Json(request),
    )
    .await;

    assert!(matches!(result, Err(AppError::ExternalService(_))));
    setup.mock_server.verify().await;
}

#[tokio::test]
async fn submission_rejects_bad_file_extension() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/provider_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![profile_row(provider_id)]))
        .mount(&setup.mock_server)
        .await;

    let request = SubmitVerificationRequest {
        provider_id,
        priority: Some(VerificationPriority::High),
        documents: vec![DocumentUpload {
            doc_type: DocumentType::GovernmentId,
            extension: "../etc".to_string(),
            content_type: "application/pdf".to_string(),
            data: BASE64.encode(b"bytes"),
            issued_at: None,
        }],
    };

    let result = submit_verification(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Json(request),
    )
    .await;

    assert!(matches!(result, Err(AppError::ValidationError(_))));
}

#[tokio::test]
async fn queue_requires_admin_and_carries_sla_labels() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");
    let provider_user = TestUser::provider("vet@example.com");

    // An urgent request 30 hours old has breached its 24 hour goal
    Mock::given(method("GET"))
        .and(path("/rest/v1/verification_requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![request_row(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "pending",
            "urgent",
            30,
            false,
        )]))
        .mount(&setup.mock_server)
        .await;

    let query = VerificationQueueQuery {
        status: None,
        priority: None,
        sla: None,
        limit: None,
        offset: None,
    };

    let result = review_queue(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Query(query),
    )
    .await;

    let Json(body) = result.expect("queue should load");
    assert_eq!(body["count"], json!(1));
    assert_eq!(body["queue"][0]["sla"]["status"], json!("Breached"));

    let query = VerificationQueueQuery {
        status: None,
        priority: None,
        sla: None,
        limit: None,
        offset: None,
    };
    let denied = review_queue(
        State(setup.state.clone()),
        setup.auth_for(&provider_user),
        extension_for(&provider_user),
        Query(query),
    )
    .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn deciding_twice_conflicts() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");
    let request_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/verification_requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![request_row(
            request_id,
            Uuid::new_v4(),
            "approved",
            "standard",
            10,
            true,
        )]))
        .mount(&setup.mock_server)
        .await;

    let result = approve_request(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Path(request_id),
        Json(ReviewDecisionRequest { notes: None }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn annotation_rect_bounds_are_enforced() {
    let setup = TestSetup::new().await;
    let admin = TestUser::admin("admin@example.com");
    let document_id = Uuid::new_v4();

    let request = CreateAnnotationRequest {
        page: 1,
        rect: AnnotationRect { x: 0.9, y: 0.1, w: 0.5, h: 0.2 },
        note: "Signature runs off the page".to_string(),
    };

    let result = create_annotation(
        State(setup.state.clone()),
        setup.auth_for(&admin),
        extension_for(&admin),
        Path(document_id),
        Json(request),
    )
    .await;

    assert!(matches!(result, Err(AppError::ValidationError(_))));
}

#[tokio::test]
async fn non_admin_cannot_write_annotations() {
    let setup = TestSetup::new().await;
    let clinic = TestUser::clinic("clinic@example.com");
    let document_id = Uuid::new_v4();

    let request = CreateAnnotationRequest {
        page: 1,
        rect: AnnotationRect { x: 0.1, y: 0.1, w: 0.2, h: 0.2 },
        note: "Looks fine".to_string(),
    };

    let result = create_annotation(
        State(setup.state.clone()),
        setup.auth_for(&clinic),
        extension_for(&clinic),
        Path(document_id),
        Json(request),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}
