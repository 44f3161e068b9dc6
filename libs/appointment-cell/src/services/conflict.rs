use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, ConflictCheckResponse, SuggestedSlot};

pub struct ConflictDetectionService {
    supabase: SupabaseClient,
}

impl ConflictDetectionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Check whether `[start_time, end_time)` collides with the provider's
    /// active appointments, suggesting up to three same-day alternatives when
    /// it does.
    pub async fn check_conflicts(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!(
            "Checking conflicts for provider {} from {} to {}",
            provider_id, start_time, end_time
        );

        if start_time >= end_time {
            return Err(AppointmentError::InvalidTime(
                "Start time must be before end time".to_string(),
            ));
        }

        // Everything booked that day; suggestions reuse the same rows
        let day_appointments = self
            .provider_appointments_for_day(provider_id, start_time, exclude_appointment_id, auth_token)
            .await?;

        let conflicting_appointments: Vec<Appointment> = day_appointments
            .iter()
            .filter(|apt| apt.status.is_active())
            .filter(|apt| {
                intervals_overlap(
                    start_time,
                    end_time,
                    apt.scheduled_start_time,
                    apt.scheduled_end_time,
                )
            })
            .cloned()
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();

        let suggested_alternatives = if has_conflict {
            warn!(
                "Conflict detected for provider {} - {} conflicting appointments",
                provider_id,
                conflicting_appointments.len()
            );
            suggest_alternatives(provider_id, start_time, end_time, &day_appointments)
        } else {
            vec![]
        };

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
            suggested_alternatives,
        })
    }

    /// Conflict check widened by a buffer on both sides, used to keep travel
    /// time between mobile visits.
    pub async fn check_with_buffer(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        buffer_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let buffer = Duration::minutes(buffer_minutes as i64);
        self.check_conflicts(
            provider_id,
            start_time - buffer,
            end_time + buffer,
            exclude_appointment_id,
            auth_token,
        )
        .await
    }

    async fn provider_appointments_for_day(
        &self,
        provider_id: Uuid,
        reference: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let day_start = reference
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let day_end = day_start + Duration::days(1);

        let mut query_parts = vec![
            format!("provider_id=eq.{}", provider_id),
            format!("scheduled_start_time=gte.{}", day_start.to_rfc3339()),
            format!("scheduled_start_time=lt.{}", day_end.to_rfc3339()),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=scheduled_start_time.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }
}

pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

/// Scan the provider's working day in 30-minute steps for the first free
/// windows of the same length, skipping the requested time itself.
pub fn suggest_alternatives(
    provider_id: Uuid,
    original_start: DateTime<Utc>,
    original_end: DateTime<Utc>,
    day_appointments: &[Appointment],
) -> Vec<SuggestedSlot> {
    let duration = original_end - original_start;
    let day = original_start.date_naive();

    let scan_start = day.and_hms_opt(8, 0, 0).unwrap_or_default().and_utc();
    let scan_end = day.and_hms_opt(20, 0, 0).unwrap_or_default().and_utc();

    let mut suggestions = Vec::new();
    let mut cursor = scan_start;

    while cursor + duration <= scan_end && suggestions.len() < 3 {
        let slot_end = cursor + duration;

        let free = cursor != original_start
            && !day_appointments.iter().any(|apt| {
                apt.status.is_active()
                    && intervals_overlap(
                        cursor,
                        slot_end,
                        apt.scheduled_start_time,
                        apt.scheduled_end_time,
                    )
            });

        if free {
            suggestions.push(SuggestedSlot {
                start_time: cursor,
                end_time: slot_end,
                provider_id,
            });
        }

        cursor += Duration::minutes(30);
    }

    suggestions
}
