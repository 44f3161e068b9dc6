use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use provider_cell::services::profile::ProviderProfileService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentSearchQuery, BookAppointmentRequest, CancelAppointmentRequest,
    CompleteAppointmentRequest, ConflictCheckQuery, RescheduleAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub hours_ahead: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub provider_id: Option<Uuid>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::PetNotFound => AppError::NotFound("Pet not found".to_string()),
        AppointmentError::ProviderNotFound => AppError::NotFound("Provider not found".to_string()),
        AppointmentError::ProviderUnavailable => {
            AppError::BadRequest("Provider is not accepting bookings".to_string())
        }
        AppointmentError::OutsideAvailability => {
            AppError::BadRequest("Requested time is outside the provider's availability".to_string())
        }
        AppointmentError::ConflictDetected => {
            AppError::Conflict("Appointment slot no longer available".to_string())
        }
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::InvalidStatusTransition(from, to) => {
            AppError::Conflict(format!("Appointment cannot change from {} to {}", from, to))
        }
        AppointmentError::Unauthorized => {
            AppError::Forbidden("Unauthorized access to appointment".to_string())
        }
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let is_owner = request.owner_id.to_string() == user.id;
    if !is_owner && !user.is_admin() && !user.is_clinic() {
        return Err(AppError::Forbidden(
            "Not authorized to book appointments for this owner".to_string(),
        ));
    }

    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .book_appointment(request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);
    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let is_owner = appointment.owner_id.to_string() == user.id;
    if !is_owner && !user.is_admin() && !user.is_provider() && !user.is_clinic() {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    // Owners only see their own bookings regardless of filters
    if user.is_pet_owner() {
        let owner_id: Uuid = user
            .id
            .parse()
            .map_err(|_| AppError::Auth("Caller id is not a valid UUID".to_string()))?;
        query.owner_id = Some(owner_id);
    }

    let service = AppointmentBookingService::new(&state);
    let appointments = service
        .search_appointments(&query, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let count = appointments.len();
    Ok(Json(json!({ "appointments": appointments, "count": count })))
}

#[axum::debug_handler]
pub async fn upcoming_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<Value>, AppError> {
    let hours_ahead = query.hours_ahead.unwrap_or(48);
    let service = AppointmentBookingService::new(&state);

    let (owner_filter, provider_filter) = if user.is_provider() {
        let profiles = ProviderProfileService::new(&state);
        let profile = profiles
            .get_profile_by_user(&user.id, auth.token())
            .await
            .map_err(|_| AppError::NotFound("Provider profile not found".to_string()))?;
        (None, Some(profile.id))
    } else {
        let owner_id: Uuid = user
            .id
            .parse()
            .map_err(|_| AppError::Auth("Caller id is not a valid UUID".to_string()))?;
        (Some(owner_id), None)
    };

    let appointments = service
        .upcoming_appointments(owner_filter, provider_filter, hours_ahead, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let count = appointments.len();
    Ok(Json(json!({ "appointments": appointments, "count": count })))
}

#[axum::debug_handler]
pub async fn get_owner_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if owner_id.to_string() != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to view this owner's appointments".to_string(),
        ));
    }

    let query = AppointmentSearchQuery {
        owner_id: Some(owner_id),
        provider_id: None,
        pet_id: None,
        status: None,
        visit_type: None,
        from_date: None,
        to_date: None,
        limit: None,
        offset: None,
    };

    let service = AppointmentBookingService::new(&state);
    let appointments = service
        .search_appointments(&query, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn get_provider_appointments(
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
                "Not authorized to view this provider's appointments".to_string(),
            ));
        }
    }

    let query = AppointmentSearchQuery {
        owner_id: None,
        provider_id: Some(provider_id),
        pet_id: None,
        status: None,
        visit_type: None,
        from_date: None,
        to_date: None,
        limit: None,
        offset: None,
    };

    let service = AppointmentBookingService::new(&state);
    let appointments = service
        .search_appointments(&query, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

// ==============================================================================
// CONFLICT AND STATS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ConflictDetectionService::new(&state);
    let response = service
        .check_conflicts(
            query.provider_id,
            query.start_time,
            query.end_time,
            query.exclude_appointment_id,
            auth.token(),
        )
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(response)))
}

#[axum::debug_handler]
pub async fn get_appointment_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        // Providers may read stats scoped to their own profile
        let provider_id = query
            .provider_id
            .ok_or_else(|| AppError::Forbidden("Admin access required".to_string()))?;

        let profiles = ProviderProfileService::new(&state);
        let profile = profiles
            .get_profile(provider_id, auth.token())
            .await
            .map_err(|_| AppError::NotFound("Provider not found".to_string()))?;

        if profile.user_id.to_string() != user.id {
            return Err(AppError::Forbidden(
                "Not authorized to view these stats".to_string(),
            ));
        }
    }

    let service = AppointmentBookingService::new(&state);
    let stats = service
        .appointment_stats(query.provider_id, query.from_date, query.to_date, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "stats": stats })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers can confirm appointments".to_string(),
        ));
    }

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .confirm(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn start_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers can start appointments".to_string(),
        ));
    }

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .start(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers can complete appointments".to_string(),
        ));
    }

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .complete(appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only providers can mark a no-show".to_string(),
        ));
    }

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .mark_no_show(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = AppointmentBookingService::new(&state);
    let appointment = booking
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let is_owner = appointment.owner_id.to_string() == user.id;
    if !is_owner && !user.is_admin() && !user.is_provider() && !user.is_clinic() {
        return Err(AppError::Forbidden(
            "Not authorized to cancel this appointment".to_string(),
        ));
    }

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .cancel(appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = AppointmentBookingService::new(&state);
    let existing = booking
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let is_owner = existing.owner_id.to_string() == user.id;
    if !is_owner && !user.is_admin() && !user.is_provider() {
        return Err(AppError::Forbidden(
            "Not authorized to reschedule this appointment".to_string(),
        ));
    }

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .reschedule(appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}
