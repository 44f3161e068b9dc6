use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub pet_id: Uuid,
    pub provider_id: Uuid,
    pub referral_id: Option<Uuid>,
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub visit_type: VisitType,
    /// Mobile visits happen at the owner's address.
    pub visit_address: String,
    pub visit_lat: Option<f64>,
    pub visit_lng: Option<f64>,
    pub owner_notes: Option<String>,
    pub provider_notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration_minutes(&self) -> i64 {
        (self.scheduled_end_time - self.scheduled_start_time).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

impl AppointmentStatus {
    /// Active appointments hold their time slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::InProgress
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    #[serde(alias = "wellness", alias = "checkup")]
    WellnessExam,

    #[serde(alias = "vaccines")]
    Vaccination,

    #[serde(alias = "sick")]
    SickVisit,

    #[serde(alias = "followup")]
    FollowUp,

    #[serde(alias = "dental_cleaning")]
    Dental,

    #[serde(alias = "specialist")]
    SpecialistConsult,

    #[serde(alias = "urgent")]
    Emergency,

    EndOfLifeCare,
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitType::WellnessExam => write!(f, "wellness_exam"),
            VisitType::Vaccination => write!(f, "vaccination"),
            VisitType::SickVisit => write!(f, "sick_visit"),
            VisitType::FollowUp => write!(f, "follow_up"),
            VisitType::Dental => write!(f, "dental"),
            VisitType::SpecialistConsult => write!(f, "specialist_consult"),
            VisitType::Emergency => write!(f, "emergency"),
            VisitType::EndOfLifeCare => write!(f, "end_of_life_care"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Owner,
    Provider,
    Clinic,
    System,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub owner_id: Uuid,
    pub pet_id: Uuid,
    pub provider_id: Uuid,
    pub referral_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub visit_type: VisitType,
    pub visit_address: String,
    pub visit_lat: Option<f64>,
    pub visit_lng: Option<f64>,
    pub owner_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
    pub new_duration_minutes: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
    pub cancelled_by: CancelledBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub provider_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentSearchQuery {
    pub owner_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub pet_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub visit_type: Option<VisitType>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckQuery {
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
    pub suggested_alternatives: Vec<SuggestedSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub provider_id: Uuid,
}

// ==============================================================================
// STATISTICS MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentStats {
    pub total: usize,
    pub by_status: StatusCounts,
    pub completion_rate: f64,
    pub no_show_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub confirmed: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Pet not found")]
    PetNotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Provider is not accepting bookings")]
    ProviderUnavailable,

    #[error("Requested time is outside the provider's availability")]
    OutsideAvailability,

    #[error("Appointment conflicts with existing booking")]
    ConflictDetected,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Appointment cannot change from {0} to {1}")]
    InvalidStatusTransition(AppointmentStatus, AppointmentStatus),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_statuses_hold_slots() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Confirmed.is_active());
        assert!(AppointmentStatus::InProgress.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::NoShow.is_active());
    }

    #[test]
    fn legal_transitions() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(NoShow));
    }

    #[test]
    fn terminal_states_are_frozen() {
        use AppointmentStatus::*;
        for terminal in [Completed, Cancelled, NoShow] {
            for next in [Pending, Confirmed, InProgress, Completed, Cancelled, NoShow] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{} -> {} should be rejected",
                    terminal,
                    next
                );
            }
        }
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        assert!(!AppointmentStatus::Pending.can_transition_to(AppointmentStatus::Completed));
        assert!(!AppointmentStatus::Pending.can_transition_to(AppointmentStatus::InProgress));
    }
}
