use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Duration, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AdminError, AnomalyQuery, DateRangeQuery, ModerationRequest};
use crate::services::analytics::AnalyticsService;
use crate::services::anomaly::AnomalyDetectionService;
use crate::services::moderation::ModerationService;

fn map_admin_error(e: AdminError) -> AppError {
    match e {
        AdminError::AccountNotFound => AppError::NotFound("Account not found".to_string()),
        AdminError::AlreadyInState(state) => {
            AppError::Conflict(format!("Account is already {}", state))
        }
        AdminError::ValidationError(msg) => AppError::ValidationError(msg),
        AdminError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn require_admin(user: &User) -> Result<Uuid, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    user.id
        .parse()
        .map_err(|_| AppError::Auth("Caller id is not a valid UUID".to_string()))
}

/// Default analytics window: the trailing 30 days.
fn resolve_range(query: &DateRangeQuery) -> (DateTime<Utc>, DateTime<Utc>) {
    let to = query.to_date.unwrap_or_else(Utc::now);
    let from = query.from_date.unwrap_or(to - Duration::days(30));
    (from, to)
}

// ==============================================================================
// MODERATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn suspend_user(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ModerationRequest>,
) -> Result<Json<Value>, AppError> {
    let actor_id = require_admin(&user)?;

    let service = ModerationService::new(&state);
    let record = service
        .suspend(user_id, actor_id, &request.reason, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "success": true, "record": record })))
}

#[axum::debug_handler]
pub async fn reinstate_user(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ModerationRequest>,
) -> Result<Json<Value>, AppError> {
    let actor_id = require_admin(&user)?;

    let service = ModerationService::new(&state);
    let record = service
        .reinstate(user_id, actor_id, &request.reason, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "success": true, "record": record })))
}

#[axum::debug_handler]
pub async fn moderation_history(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = ModerationService::new(&state);
    let history = service
        .history(user_id, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "history": history })))
}

// ==============================================================================
// ANALYTICS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn appointments_per_day(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let (from, to) = resolve_range(&query);

    let service = AnalyticsService::new(&state);
    let daily = service
        .appointments_per_day(from, to, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "from": from, "to": to, "daily": daily })))
}

#[axum::debug_handler]
pub async fn bookings_breakdown(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let (from, to) = resolve_range(&query);

    let service = AnalyticsService::new(&state);
    let by_status = service
        .bookings_by_status(from, to, auth.token())
        .await
        .map_err(map_admin_error)?;
    let by_type = service
        .bookings_by_type(from, to, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({
        "from": from,
        "to": to,
        "by_status": by_status,
        "by_type": by_type
    })))
}

#[axum::debug_handler]
pub async fn verification_throughput(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let (from, to) = resolve_range(&query);

    let service = AnalyticsService::new(&state);
    let throughput = service
        .verification_throughput(from, to, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "from": from, "to": to, "throughput": throughput })))
}

#[axum::debug_handler]
pub async fn referral_funnel(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let (from, to) = resolve_range(&query);

    let service = AnalyticsService::new(&state);
    let funnel = service
        .referral_funnel(from, to, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "from": from, "to": to, "funnel": funnel })))
}

#[derive(Debug, Deserialize)]
pub struct TopProvidersQuery {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[axum::debug_handler]
pub async fn top_providers(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<TopProvidersQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let range = DateRangeQuery {
        from_date: query.from_date,
        to_date: query.to_date,
    };
    let (from, to) = resolve_range(&range);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let service = AnalyticsService::new(&state);
    let providers = service
        .top_providers(from, to, limit, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "from": from, "to": to, "providers": providers })))
}

// ==============================================================================
// ANOMALY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn booking_anomalies(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AnomalyQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let window_days = query.window_days.unwrap_or(30);
    let service = AnomalyDetectionService::new(&state);
    let report = service
        .detect(window_days, auth.token())
        .await
        .map_err(map_admin_error)?;

    Ok(Json(json!({ "report": report })))
}
