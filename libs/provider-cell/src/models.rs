use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// PROVIDER PROFILE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub specialties: Vec<String>,
    pub bio: Option<String>,
    pub license_number: Option<String>,
    pub years_of_experience: i32,
    pub home_base_lat: Option<f64>,
    pub home_base_lng: Option<f64>,
    pub service_radius_km: Option<f64>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderProfile {
    /// Full profiles score higher during verification review.
    pub fn is_profile_complete(&self) -> bool {
        self.bio.as_deref().map(|b| !b.trim().is_empty()).unwrap_or(false)
            && !self.specialties.is_empty()
            && self.home_base_lat.is_some()
            && self.home_base_lng.is_some()
            && self.service_radius_km.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProviderProfileRequest {
    pub user_id: Uuid,
    pub display_name: String,
    pub specialties: Vec<String>,
    pub bio: Option<String>,
    pub license_number: Option<String>,
    pub years_of_experience: Option<i32>,
    pub home_base_lat: Option<f64>,
    pub home_base_lng: Option<f64>,
    pub service_radius_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProviderProfileRequest {
    pub display_name: Option<String>,
    pub specialties: Option<Vec<String>>,
    pub bio: Option<String>,
    pub license_number: Option<String>,
    pub years_of_experience: Option<i32>,
    pub home_base_lat: Option<f64>,
    pub home_base_lng: Option<f64>,
    pub service_radius_km: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSearchQuery {
    pub specialty: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub limit: Option<i32>,
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub provider_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: i32,
    pub buffer_minutes: i32,
    pub is_recurring: bool,
    pub specific_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: i32,
    pub buffer_minutes: Option<i32>,
    pub is_recurring: Option<bool>,
    pub specific_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub buffer_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub full_day: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOverrideRequest {
    pub date: NaiveDate,
    pub full_day: Option<bool>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookableSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
}

/// Minimal appointment view used when subtracting booked time from slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedInterval {
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider not found")]
    NotFound,

    #[error("Availability rule not found")]
    AvailabilityNotFound,

    #[error("Availability overlaps an existing rule")]
    AvailabilityOverlap,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
