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
    AssignReferralRequest, CreateReferralRequest, DeclineReferralRequest, Referral, ReferralError,
    ReferralListQuery, ScheduleReferralRequest,
};
use crate::services::referral::ReferralService;

fn map_referral_error(e: ReferralError) -> AppError {
    match e {
        ReferralError::NotFound => AppError::NotFound("Referral not found".to_string()),
        ReferralError::NoCandidates(specialty) => AppError::BadRequest(format!(
            "No eligible providers for specialty {}",
            specialty
        )),
        ReferralError::NotACandidate => {
            AppError::Forbidden("Provider is not a candidate on this referral".to_string())
        }
        ReferralError::InvalidStatusTransition(from, to) => {
            AppError::Conflict(format!("Referral cannot move from {} to {}", from, to))
        }
        ReferralError::Unauthorized => {
            AppError::Forbidden("Unauthorized access to referral".to_string())
        }
        ReferralError::ValidationError(msg) => AppError::ValidationError(msg),
        ReferralError::SchedulingFailed(msg) => AppError::Conflict(msg),
        ReferralError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn parse_caller_uuid(user: &User) -> Result<Uuid, AppError> {
    user.id
        .parse()
        .map_err(|_| AppError::Auth("Caller id is not a valid UUID".to_string()))
}

/// The caller's provider profile; providers act on referrals through it.
async fn caller_provider_id(
    state: &Arc<AppConfig>,
    user: &User,
    token: &str,
) -> Result<Uuid, AppError> {
    let profiles = ProviderProfileService::new(state);
    let profile = profiles
        .get_profile_by_user(&user.id, token)
        .await
        .map_err(|_| AppError::NotFound("Provider profile not found".to_string()))?;
    Ok(profile.id)
}

fn can_view_referral(user: &User, referral: &Referral) -> bool {
    user.is_admin()
        || user.is_provider()
        || referral.clinic_id.to_string() == user.id
        || referral.owner_id.to_string() == user.id
}

// ==============================================================================
// HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateReferralRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_clinic() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only clinics can create referrals".to_string(),
        ));
    }

    let clinic_id = parse_caller_uuid(&user)?;
    let service = ReferralService::new(&state);
    let referral = service
        .create_referral(clinic_id, request, auth.token())
        .await
        .map_err(map_referral_error)?;

    Ok(Json(json!({ "success": true, "referral": referral })))
}

#[axum::debug_handler]
pub async fn get_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(referral_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ReferralService::new(&state);
    let referral = service
        .get_referral(referral_id, auth.token())
        .await
        .map_err(map_referral_error)?;

    if !can_view_referral(&user, &referral) {
        return Err(AppError::Forbidden(
            "Not authorized to view this referral".to_string(),
        ));
    }

    Ok(Json(json!({ "referral": referral })))
}

#[axum::debug_handler]
pub async fn list_referrals(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<ReferralListQuery>,
) -> Result<Json<Value>, AppError> {
    // Non-admins only see referrals they are a party to
    if user.is_clinic() {
        query.clinic_id = Some(parse_caller_uuid(&user)?);
    } else if user.is_pet_owner() {
        query.owner_id = Some(parse_caller_uuid(&user)?);
    } else if user.is_provider() {
        query.provider_id = Some(caller_provider_id(&state, &user, auth.token()).await?);
    } else if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let service = ReferralService::new(&state);
    let referrals = service
        .list_referrals(&query, auth.token())
        .await
        .map_err(map_referral_error)?;

    let count = referrals.len();
    Ok(Json(json!({ "referrals": referrals, "count": count })))
}

#[axum::debug_handler]
pub async fn pending_referrals(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() {
        return Err(AppError::Forbidden(
            "Only providers have a referral queue".to_string(),
        ));
    }

    let provider_id = caller_provider_id(&state, &user, auth.token()).await?;
    let service = ReferralService::new(&state);
    let referrals = service
        .pending_for_provider(provider_id, auth.token())
        .await
        .map_err(map_referral_error)?;

    let count = referrals.len();
    Ok(Json(json!({ "referrals": referrals, "count": count })))
}

#[axum::debug_handler]
pub async fn accept_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(referral_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() {
        return Err(AppError::Forbidden(
            "Only providers can accept referrals".to_string(),
        ));
    }

    let provider_id = caller_provider_id(&state, &user, auth.token()).await?;
    let service = ReferralService::new(&state);
    let referral = service
        .accept(referral_id, provider_id, auth.token())
        .await
        .map_err(map_referral_error)?;

    Ok(Json(json!({ "success": true, "referral": referral })))
}

#[axum::debug_handler]
pub async fn decline_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(referral_id): Path<Uuid>,
    Json(request): Json<DeclineReferralRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() {
        return Err(AppError::Forbidden(
            "Only providers can decline referrals".to_string(),
        ));
    }

    let provider_id = caller_provider_id(&state, &user, auth.token()).await?;
    let service = ReferralService::new(&state);
    let referral = service
        .decline(referral_id, provider_id, request.reason.as_deref(), auth.token())
        .await
        .map_err(map_referral_error)?;

    Ok(Json(json!({ "success": true, "referral": referral })))
}

#[axum::debug_handler]
pub async fn assign_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(referral_id): Path<Uuid>,
    Json(request): Json<AssignReferralRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let service = ReferralService::new(&state);
    let referral = service
        .assign(referral_id, request, auth.token())
        .await
        .map_err(map_referral_error)?;

    Ok(Json(json!({ "success": true, "referral": referral })))
}

#[axum::debug_handler]
pub async fn schedule_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(referral_id): Path<Uuid>,
    Json(request): Json<ScheduleReferralRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ReferralService::new(&state);
    let referral = service
        .get_referral(referral_id, auth.token())
        .await
        .map_err(map_referral_error)?;

    let is_party = referral.clinic_id.to_string() == user.id
        || referral.owner_id.to_string() == user.id;
    if !is_party && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to schedule this referral".to_string(),
        ));
    }

    let referral = service
        .schedule(referral_id, request, auth.token())
        .await
        .map_err(map_referral_error)?;

    Ok(Json(json!({ "success": true, "referral": referral })))
}

#[axum::debug_handler]
pub async fn start_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(referral_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers can start referral work".to_string(),
        ));
    }

    let service = ReferralService::new(&state);
    let referral = service
        .start(referral_id, auth.token())
        .await
        .map_err(map_referral_error)?;

    Ok(Json(json!({ "success": true, "referral": referral })))
}

#[axum::debug_handler]
pub async fn complete_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(referral_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers can complete referral work".to_string(),
        ));
    }

    let service = ReferralService::new(&state);
    let referral = service
        .complete(referral_id, auth.token())
        .await
        .map_err(map_referral_error)?;

    Ok(Json(json!({ "success": true, "referral": referral })))
}

#[axum::debug_handler]
pub async fn cancel_referral(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(referral_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ReferralService::new(&state);
    let referral = service
        .get_referral(referral_id, auth.token())
        .await
        .map_err(map_referral_error)?;

    let is_clinic_owner = referral.clinic_id.to_string() == user.id;
    if !is_clinic_owner && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the originating clinic can cancel a referral".to_string(),
        ));
    }

    let referral = service
        .cancel(referral_id, auth.token())
        .await
        .map_err(map_referral_error)?;

    Ok(Json(json!({ "success": true, "referral": referral })))
}
