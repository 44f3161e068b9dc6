use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use provider_cell::services::availability::AvailabilityService;
use provider_cell::services::profile::ProviderProfileService;

use notification_cell::services::notify::NotificationService;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CancelAppointmentRequest, CancelledBy,
    CompleteAppointmentRequest, RescheduleAppointmentRequest,
};
use crate::services::booking::{parse_single_appointment, window_within_availability};
use crate::services::conflict::ConflictDetectionService;

pub struct AppointmentLifecycleService {
    supabase: SupabaseClient,
    conflicts: ConflictDetectionService,
    availability: AvailabilityService,
    profiles: ProviderProfileService,
    notifications: NotificationService,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            conflicts: ConflictDetectionService::new(config),
            availability: AvailabilityService::new(config),
            profiles: ProviderProfileService::new(config),
            notifications: NotificationService::new(config),
        }
    }

    pub async fn confirm(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .transition(
                appointment_id,
                AppointmentStatus::Confirmed,
                json!({}),
                auth_token,
            )
            .await?;

        self.notifications
            .appointment_confirmed(appointment.owner_id, appointment.id, auth_token)
            .await;

        Ok(appointment)
    }

    pub async fn start(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.transition(
            appointment_id,
            AppointmentStatus::InProgress,
            json!({ "actual_start_time": Utc::now().to_rfc3339() }),
            auth_token,
        )
        .await
    }

    pub async fn complete(
        &self,
        appointment_id: Uuid,
        request: CompleteAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.transition(
            appointment_id,
            AppointmentStatus::Completed,
            json!({
                "actual_end_time": Utc::now().to_rfc3339(),
                "provider_notes": request.provider_notes
            }),
            auth_token,
        )
        .await
    }

    pub async fn mark_no_show(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::NoShow, json!({}), auth_token)
            .await
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Cancellation reason cannot be empty".to_string(),
            ));
        }

        let appointment = self
            .transition(
                appointment_id,
                AppointmentStatus::Cancelled,
                json!({
                    "cancellation_reason": request.reason,
                    "cancelled_by": request.cancelled_by
                }),
                auth_token,
            )
            .await?;

        // Tell the side that did not cancel
        let recipient = match request.cancelled_by {
            CancelledBy::Owner | CancelledBy::Clinic | CancelledBy::System => self
                .profiles
                .get_profile(appointment.provider_id, auth_token)
                .await
                .ok()
                .map(|p| p.user_id),
            CancelledBy::Provider => Some(appointment.owner_id),
        };

        if let Some(recipient) = recipient {
            self.notifications
                .appointment_cancelled(recipient, appointment.id, &request.reason, auth_token)
                .await;
        }

        Ok(appointment)
    }

    /// Move an active appointment to a new window; the window is re-validated
    /// against availability and conflicts exactly like a fresh booking.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Rescheduling appointment {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        if !matches!(
            current.status,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        ) {
            // A reschedule would put the appointment back to pending
            return Err(AppointmentError::InvalidStatusTransition(
                current.status,
                AppointmentStatus::Pending,
            ));
        }

        let duration_minutes = request
            .new_duration_minutes
            .map(|m| m as i64)
            .unwrap_or_else(|| current.duration_minutes());

        let new_start = request.new_start_time;
        let new_end = new_start + Duration::minutes(duration_minutes);

        if new_start <= Utc::now() {
            return Err(AppointmentError::InvalidTime(
                "Appointments must be rescheduled into the future".to_string(),
            ));
        }
        if new_start.date_naive() != new_end.date_naive() {
            return Err(AppointmentError::InvalidTime(
                "Appointments cannot span midnight".to_string(),
            ));
        }

        let rules = self
            .availability
            .list_rules(current.provider_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        let overrides = self
            .availability
            .list_overrides(current.provider_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let covering_rule = window_within_availability(&rules, &overrides, new_start, new_end)
            .ok_or(AppointmentError::OutsideAvailability)?;

        let conflict_response = self
            .conflicts
            .check_with_buffer(
                current.provider_id,
                new_start,
                new_end,
                covering_rule.buffer_minutes,
                Some(appointment_id),
                auth_token,
            )
            .await?;

        if conflict_response.has_conflict {
            return Err(AppointmentError::ConflictDetected);
        }

        let update = json!({
            "scheduled_start_time": new_start.to_rfc3339(),
            "scheduled_end_time": new_end.to_rfc3339(),
            "status": "pending",
            "updated_at": Utc::now().to_rfc3339()
        });

        let updated = self.patch_appointment(appointment_id, update, auth_token).await?;

        info!(
            "Appointment {} rescheduled to {}",
            appointment_id, new_start
        );

        Ok(updated)
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        next: AppointmentStatus,
        extra_fields: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;

        if !current.status.can_transition_to(next) {
            return Err(AppointmentError::InvalidStatusTransition(current.status, next));
        }

        let mut update = json!({
            "status": next,
            "updated_at": Utc::now().to_rfc3339()
        });

        if let (Some(map), Some(extra)) = (update.as_object_mut(), extra_fields.as_object()) {
            for (key, value) in extra {
                if !value.is_null() {
                    map.insert(key.clone(), value.clone());
                }
            }
        }

        self.patch_appointment(appointment_id, update, auth_token).await
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        parse_single_appointment(result)
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        parse_single_appointment(result)
    }
}
