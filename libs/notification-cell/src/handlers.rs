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

use crate::models::{NotificationError, NotificationListQuery, ReminderSweepQuery};
use crate::services::notify::NotificationService;

fn map_notification_error(e: NotificationError) -> AppError {
    match e {
        NotificationError::NotFound => AppError::NotFound("Notification not found".to_string()),
        NotificationError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn caller_uuid(user: &User) -> Result<Uuid, AppError> {
    user.id
        .parse()
        .map_err(|_| AppError::Auth("Caller id is not a valid UUID".to_string()))
}

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<Value>, AppError> {
    let recipient = caller_uuid(&user)?;

    let service = NotificationService::new(&state);
    let notifications = service
        .list_for_recipient(recipient, &query, auth.token())
        .await
        .map_err(map_notification_error)?;

    let unread = notifications.iter().filter(|n| !n.is_read).count();
    Ok(Json(json!({
        "notifications": notifications,
        "unread_count": unread
    })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let recipient = caller_uuid(&user)?;

    let service = NotificationService::new(&state);
    let notification = service
        .mark_read(notification_id, recipient, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({ "success": true, "notification": notification })))
}

/// Scheduler entry point: record reminders for appointments starting soon.
#[axum::debug_handler]
pub async fn run_reminder_sweep(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ReminderSweepQuery>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let service = NotificationService::new(&state);
    let sent = service
        .send_upcoming_reminders(query.hours_ahead.unwrap_or(24), auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({ "success": true, "reminders_sent": sent })))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let recipient = caller_uuid(&user)?;

    let service = NotificationService::new(&state);
    let updated = service
        .mark_all_read(recipient, auth.token())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({ "success": true, "updated": updated })))
}
