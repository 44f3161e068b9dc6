use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateAvailabilityRequest, CreateOverrideRequest, CreateProviderProfileRequest, ProviderError,
    ProviderSearchQuery, SlotQuery, UpdateAvailabilityRequest, UpdateProviderProfileRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::profile::ProviderProfileService;

fn map_provider_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::NotFound => AppError::NotFound("Provider not found".to_string()),
        ProviderError::AvailabilityNotFound => {
            AppError::NotFound("Availability rule not found".to_string())
        }
        ProviderError::AvailabilityOverlap => {
            AppError::Conflict("Availability overlaps an existing rule".to_string())
        }
        ProviderError::ValidationError(msg) => AppError::ValidationError(msg),
        ProviderError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateProviderProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let is_self = request.user_id.to_string() == user.id;
    if !is_self && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to create a profile for this user".to_string(),
        ));
    }
    if is_self && !user.is_provider() {
        return Err(AppError::Forbidden(
            "Only provider accounts can create provider profiles".to_string(),
        ));
    }

    let service = ProviderProfileService::new(&state);
    let profile = service
        .create_profile(request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "success": true, "profile": profile })))
}

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ProviderProfileService::new(&state);
    let profile = service
        .get_profile(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "profile": profile })))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<UpdateProviderProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ProviderProfileService::new(&state);

    let existing = service
        .get_profile(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    if existing.user_id.to_string() != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to update this profile".to_string(),
        ));
    }

    let profile = service
        .update_profile(provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "success": true, "profile": profile })))
}

#[axum::debug_handler]
pub async fn search_providers(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(query): Query<ProviderSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ProviderProfileService::new(&state);
    let providers = service
        .search_providers(query, auth.token())
        .await
        .map_err(map_provider_error)?;

    let count = providers.len();
    Ok(Json(json!({ "providers": providers, "count": count })))
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

/// Providers manage their own schedule; admins can act on any.
async fn authorize_schedule_access(
    state: &Arc<AppConfig>,
    user: &User,
    provider_id: Uuid,
    token: &str,
) -> Result<(), AppError> {
    if user.is_admin() {
        return Ok(());
    }

    let profiles = ProviderProfileService::new(state);
    let profile = profiles
        .get_profile(provider_id, token)
        .await
        .map_err(map_provider_error)?;

    if profile.user_id.to_string() != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to manage this provider's schedule".to_string(),
        ));
    }

    Ok(())
}

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_schedule_access(&state, &user, provider_id, auth.token()).await?;

    let service = AvailabilityService::new(&state);
    let rule = service
        .create_rule(provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "success": true, "availability": rule })))
}

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let rules = service
        .list_rules(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "availability": rules })))
}

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path((provider_id, rule_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_schedule_access(&state, &user, provider_id, auth.token()).await?;

    let service = AvailabilityService::new(&state);
    let rule = service
        .update_rule(rule_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "success": true, "availability": rule })))
}

#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path((provider_id, rule_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    authorize_schedule_access(&state, &user, provider_id, auth.token()).await?;

    let service = AvailabilityService::new(&state);
    service
        .delete_rule(rule_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn create_override(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<CreateOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    authorize_schedule_access(&state, &user, provider_id, auth.token()).await?;

    let service = AvailabilityService::new(&state);
    let block = service
        .create_override(provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "success": true, "override": block })))
}

#[axum::debug_handler]
pub async fn list_overrides(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let overrides = service
        .list_overrides(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "overrides": overrides })))
}

#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let slots = service
        .compute_slots(provider_id, query.date, auth.token())
        .await
        .map_err(map_provider_error)?;

    let count = slots.len();
    Ok(Json(json!({
        "date": query.date,
        "slots": slots,
        "count": count
    })))
}
