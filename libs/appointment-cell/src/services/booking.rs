use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use provider_cell::models::{AvailabilityOverride, AvailabilityRule};
use provider_cell::services::availability::AvailabilityService;
use provider_cell::services::profile::ProviderProfileService;

use notification_cell::services::notify::NotificationService;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStats,
    BookAppointmentRequest, StatusCounts,
};
use crate::services::conflict::ConflictDetectionService;

#[derive(Debug, Deserialize)]
struct PetRow {
    #[allow(dead_code)]
    id: Uuid,
    owner_id: Uuid,
    name: String,
}

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    conflicts: ConflictDetectionService,
    availability: AvailabilityService,
    profiles: ProviderProfileService,
    notifications: NotificationService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            conflicts: ConflictDetectionService::new(config),
            availability: AvailabilityService::new(config),
            profiles: ProviderProfileService::new(config),
            notifications: NotificationService::new(config),
        }
    }

    /// Book a mobile visit. Validates pet ownership, provider standing, and
    /// availability before running the conflict check and inserting.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Booking appointment for pet {} with provider {}",
            request.pet_id, request.provider_id
        );

        if request.duration_minutes < 15 || request.duration_minutes > 480 {
            return Err(AppointmentError::ValidationError(
                "Duration must be between 15 and 480 minutes".to_string(),
            ));
        }
        if request.visit_address.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Visit address cannot be empty".to_string(),
            ));
        }

        let start_time = request.start_time;
        let end_time = start_time + Duration::minutes(request.duration_minutes as i64);

        if start_time <= Utc::now() {
            return Err(AppointmentError::InvalidTime(
                "Appointments must be booked in the future".to_string(),
            ));
        }
        if start_time.date_naive() != end_time.date_naive() {
            return Err(AppointmentError::InvalidTime(
                "Appointments cannot span midnight".to_string(),
            ));
        }

        // Pet must belong to the owner on the request
        let pet = self.get_pet(request.pet_id, auth_token).await?;
        if pet.owner_id != request.owner_id {
            return Err(AppointmentError::Unauthorized);
        }

        // Provider must be live on the marketplace
        let provider = self
            .profiles
            .get_profile(request.provider_id, auth_token)
            .await
            .map_err(|_| AppointmentError::ProviderNotFound)?;

        if !provider.is_active || !provider.is_verified {
            return Err(AppointmentError::ProviderUnavailable);
        }

        // Suspended owners cannot place new bookings
        let account = self
            .supabase
            .get_account(&request.owner_id.to_string(), auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        if account
            .get("is_suspended")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            return Err(AppointmentError::Unauthorized);
        }

        // Window must sit inside a declared availability rule
        let rules = self
            .availability
            .list_rules(request.provider_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        let overrides = self
            .availability
            .list_overrides(request.provider_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let covering_rule = window_within_availability(&rules, &overrides, start_time, end_time)
            .ok_or(AppointmentError::OutsideAvailability)?;

        // Conflict check honours the rule's travel buffer
        let conflict_response = self
            .conflicts
            .check_with_buffer(
                request.provider_id,
                start_time,
                end_time,
                covering_rule.buffer_minutes,
                None,
                auth_token,
            )
            .await?;

        if conflict_response.has_conflict {
            return Err(AppointmentError::ConflictDetected);
        }

        let now = Utc::now().to_rfc3339();
        let appointment_data = json!({
            "owner_id": request.owner_id,
            "pet_id": request.pet_id,
            "provider_id": request.provider_id,
            "referral_id": request.referral_id,
            "scheduled_start_time": start_time.to_rfc3339(),
            "scheduled_end_time": end_time.to_rfc3339(),
            "status": "pending",
            "visit_type": request.visit_type,
            "visit_address": request.visit_address,
            "visit_lat": request.visit_lat,
            "visit_lng": request.visit_lng,
            "owner_notes": request.owner_notes,
            "created_at": now,
            "updated_at": now
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = parse_single_appointment(result)?;

        info!(
            "Appointment {} booked for pet {} with provider {}",
            appointment.id, request.pet_id, request.provider_id
        );

        self.notifications
            .appointment_booked(provider.user_id, appointment.id, &pet.name, auth_token)
            .await;

        Ok(appointment)
    }

    pub async fn get_appointment(
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

    pub async fn search_appointments(
        &self,
        query: &AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = Vec::new();

        if let Some(owner_id) = query.owner_id {
            query_parts.push(format!("owner_id=eq.{}", owner_id));
        }
        if let Some(provider_id) = query.provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
        }
        if let Some(pet_id) = query.pet_id {
            query_parts.push(format!("pet_id=eq.{}", pet_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(visit_type) = &query.visit_type {
            query_parts.push(format!("visit_type=eq.{}", visit_type));
        }
        if let Some(from) = query.from_date {
            query_parts.push(format!("scheduled_start_time=gte.{}", from.to_rfc3339()));
        }
        if let Some(to) = query.to_date {
            query_parts.push(format!("scheduled_start_time=lte.{}", to.to_rfc3339()));
        }

        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let offset = query.offset.unwrap_or(0).max(0);

        let filter = if query_parts.is_empty() {
            String::new()
        } else {
            format!("{}&", query_parts.join("&"))
        };

        let path = format!(
            "/rest/v1/appointments?{}order=scheduled_start_time.desc&limit={}&offset={}",
            filter, limit, offset
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        parse_appointments(result)
    }

    /// Active appointments starting within the next `hours_ahead` hours for
    /// either side of the marketplace.
    pub async fn upcoming_appointments(
        &self,
        owner_id: Option<Uuid>,
        provider_id: Option<Uuid>,
        hours_ahead: i32,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let now = Utc::now();
        let horizon = now + Duration::hours(hours_ahead.clamp(1, 24 * 14) as i64);

        let mut query_parts = vec![
            format!("scheduled_start_time=gte.{}", now.to_rfc3339()),
            format!("scheduled_start_time=lte.{}", horizon.to_rfc3339()),
            "status=in.(pending,confirmed)".to_string(),
        ];

        if let Some(owner_id) = owner_id {
            query_parts.push(format!("owner_id=eq.{}", owner_id));
        }
        if let Some(provider_id) = provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
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

        parse_appointments(result)
    }

    pub async fn appointment_stats(
        &self,
        provider_id: Option<Uuid>,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
        auth_token: &str,
    ) -> Result<AppointmentStats, AppointmentError> {
        let mut query_parts = Vec::new();

        if let Some(provider_id) = provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
        }
        if let Some(from) = from_date {
            query_parts.push(format!("scheduled_start_time=gte.{}", from.to_rfc3339()));
        }
        if let Some(to) = to_date {
            query_parts.push(format!("scheduled_start_time=lte.{}", to.to_rfc3339()));
        }

        let filter = if query_parts.is_empty() {
            String::new()
        } else {
            format!("?{}", query_parts.join("&"))
        };

        let path = format!("/rest/v1/appointments{}", filter);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments = parse_appointments(result)?;
        Ok(compute_stats(&appointments))
    }

    async fn get_pet(&self, pet_id: Uuid, auth_token: &str) -> Result<PetRow, AppointmentError> {
        let path = format!("/rest/v1/pets?id=eq.{}&select=id,owner_id,name", pet_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::PetNotFound)?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse pet: {}", e)))
    }
}

/// Find the availability rule whose window contains the requested interval on
/// its date, unless an override blocks it.
pub fn window_within_availability<'a>(
    rules: &'a [AvailabilityRule],
    overrides: &[AvailabilityOverride],
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Option<&'a AvailabilityRule> {
    use chrono::Datelike;

    let date = start_time.date_naive();
    let weekday = date.weekday().num_days_from_sunday() as i32;

    for ov in overrides.iter().filter(|o| o.date == date) {
        if ov.full_day {
            return None;
        }
        if let (Some(block_start), Some(block_end)) = (ov.start_time, ov.end_time) {
            let block_start = date.and_time(block_start).and_utc();
            let block_end = date.and_time(block_end).and_utc();
            if start_time < block_end && block_start < end_time {
                return None;
            }
        }
    }

    rules.iter().find(|rule| {
        let applies = match rule.specific_date {
            Some(pinned) => pinned == date,
            None => rule.is_recurring && rule.day_of_week == weekday,
        };
        applies && start_time.time() >= rule.start_time && end_time.time() <= rule.end_time
    })
}

pub fn compute_stats(appointments: &[Appointment]) -> AppointmentStats {
    use crate::models::AppointmentStatus::*;

    let mut by_status = StatusCounts::default();
    for apt in appointments {
        match apt.status {
            Pending => by_status.pending += 1,
            Confirmed => by_status.confirmed += 1,
            InProgress => by_status.in_progress += 1,
            Completed => by_status.completed += 1,
            Cancelled => by_status.cancelled += 1,
            NoShow => by_status.no_show += 1,
        }
    }

    let total = appointments.len();
    let decided = by_status.completed + by_status.cancelled + by_status.no_show;

    let completion_rate = if decided > 0 {
        by_status.completed as f64 / decided as f64
    } else {
        0.0
    };
    let no_show_rate = if decided > 0 {
        by_status.no_show as f64 / decided as f64
    } else {
        0.0
    };

    AppointmentStats {
        total,
        by_status,
        completion_rate,
        no_show_rate,
    }
}

pub(crate) fn parse_single_appointment(result: Vec<Value>) -> Result<Appointment, AppointmentError> {
    let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
    serde_json::from_value(row).map_err(|e| {
        AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
    })
}

pub(crate) fn parse_appointments(result: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
    result
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Appointment>, _>>()
        .map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
        })
}
