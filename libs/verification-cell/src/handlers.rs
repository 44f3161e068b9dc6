use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use provider_cell::services::profile::ProviderProfileService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateAnnotationRequest, ReviewDecisionRequest, SubmitVerificationRequest,
    UpdateAnnotationRequest, VerificationError, VerificationPriority, VerificationQueueQuery,
};
use crate::services::annotations::AnnotationService;
use crate::services::review::VerificationReviewService;
use crate::services::submission::VerificationSubmissionService;

fn map_verification_error(e: VerificationError) -> AppError {
    match e {
        VerificationError::NotFound => {
            AppError::NotFound("Verification request not found".to_string())
        }
        VerificationError::DocumentNotFound => AppError::NotFound("Document not found".to_string()),
        VerificationError::AnnotationNotFound => {
            AppError::NotFound("Annotation not found".to_string())
        }
        VerificationError::AlreadyDecided(status) => {
            AppError::Conflict(format!("Request already decided as {}", status))
        }
        VerificationError::Unauthorized => {
            AppError::Forbidden("Unauthorized access to verification data".to_string())
        }
        VerificationError::ValidationError(msg) => AppError::ValidationError(msg),
        VerificationError::UploadFailed(msg) => AppError::ExternalService(msg),
        VerificationError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn parse_caller_uuid(user: &User) -> Result<Uuid, AppError> {
    user.id
        .parse()
        .map_err(|_| AppError::Auth("Caller id is not a valid UUID".to_string()))
}

// ==============================================================================
// SUBMISSION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn submit_verification(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SubmitVerificationRequest>,
) -> Result<Json<Value>, AppError> {
    // Providers submit for their own profile; clinics onboard providers
    if user.is_provider() {
        let profiles = ProviderProfileService::new(&state);
        let profile = profiles
            .get_profile(request.provider_id, auth.token())
            .await
            .map_err(|_| AppError::NotFound("Provider not found".to_string()))?;
        if profile.user_id.to_string() != user.id {
            return Err(AppError::Forbidden(
                "Providers can only submit their own verification".to_string(),
            ));
        }
    } else if !user.is_clinic() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to submit verification requests".to_string(),
        ));
    }

    // Clinic onboarding defaults to a tighter review goal
    let mut request = request;
    if request.priority.is_none() && user.is_clinic() {
        request.priority = Some(VerificationPriority::High);
    }

    let submitted_by = parse_caller_uuid(&user)?;
    let service = VerificationSubmissionService::new(&state);
    let created = service
        .submit(submitted_by, request, auth.token())
        .await
        .map_err(map_verification_error)?;

    Ok(Json(json!({ "success": true, "request": created })))
}

#[axum::debug_handler]
pub async fn provider_requests(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        let profiles = ProviderProfileService::new(&state);
        let profile = profiles
            .get_profile(provider_id, auth.token())
            .await
            .map_err(|_| AppError::NotFound("Provider not found".to_string()))?;
        if profile.user_id.to_string() != user.id {
            return Err(AppError::Forbidden(
                "Not authorized to view these verification requests".to_string(),
            ));
        }
    }

    let service = VerificationSubmissionService::new(&state);
    let requests = service
        .requests_for_provider(provider_id, auth.token())
        .await
        .map_err(map_verification_error)?;

    let count = requests.len();
    Ok(Json(json!({ "requests": requests, "count": count })))
}

// ==============================================================================
// ADMIN REVIEW HANDLERS
// ==============================================================================

fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

#[axum::debug_handler]
pub async fn review_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<VerificationQueueQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = VerificationReviewService::new(&state);
    let entries = service
        .queue(&query, auth.token())
        .await
        .map_err(map_verification_error)?;

    let count = entries.len();
    Ok(Json(json!({ "queue": entries, "count": count })))
}

#[axum::debug_handler]
pub async fn request_detail(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = VerificationReviewService::new(&state);
    let detail = service
        .detail(request_id, auth.token())
        .await
        .map_err(map_verification_error)?;

    Ok(Json(json!({ "request": detail })))
}

#[axum::debug_handler]
pub async fn approve_request(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
    Json(decision): Json<ReviewDecisionRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let reviewer_id = parse_caller_uuid(&user)?;
    let service = VerificationReviewService::new(&state);
    let request = service
        .approve(request_id, reviewer_id, decision, auth.token())
        .await
        .map_err(map_verification_error)?;

    Ok(Json(json!({ "success": true, "request": request })))
}

#[axum::debug_handler]
pub async fn reject_request(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
    Json(decision): Json<ReviewDecisionRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let reviewer_id = parse_caller_uuid(&user)?;
    let service = VerificationReviewService::new(&state);
    let request = service
        .reject(request_id, reviewer_id, decision, auth.token())
        .await
        .map_err(map_verification_error)?;

    Ok(Json(json!({ "success": true, "request": request })))
}

// ==============================================================================
// ANNOTATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_annotation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<CreateAnnotationRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let author_id = parse_caller_uuid(&user)?;
    let service = AnnotationService::new(&state);
    let annotation = service
        .create(document_id, author_id, request, auth.token())
        .await
        .map_err(map_verification_error)?;

    Ok(Json(json!({ "success": true, "annotation": annotation })))
}

#[axum::debug_handler]
pub async fn list_annotations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AnnotationService::new(&state);
    let annotations = service
        .list_for_document(document_id, auth.token())
        .await
        .map_err(map_verification_error)?;

    let count = annotations.len();
    Ok(Json(json!({ "annotations": annotations, "count": count })))
}

#[axum::debug_handler]
pub async fn update_annotation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path((_document_id, annotation_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateAnnotationRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AnnotationService::new(&state);
    let annotation = service
        .update(annotation_id, request, auth.token())
        .await
        .map_err(map_verification_error)?;

    Ok(Json(json!({ "success": true, "annotation": annotation })))
}

#[axum::debug_handler]
pub async fn delete_annotation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path((_document_id, annotation_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AnnotationService::new(&state);
    service
        .delete(annotation_id, auth.token())
        .await
        .map_err(map_verification_error)?;

    Ok(Json(json!({ "success": true })))
}
