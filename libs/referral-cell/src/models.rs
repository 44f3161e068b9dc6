use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// REFERRAL MODELS
// ==============================================================================

/// A clinic-initiated service request routing a case to a specialist provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub owner_id: Uuid,
    pub pet_id: Uuid,
    /// Set once a provider accepts (or an admin assigns manually).
    pub provider_id: Option<Uuid>,
    pub required_specialty: String,
    pub urgency: ReferralUrgency,
    pub case_summary: String,
    pub status: ReferralStatus,
    #[serde(default)]
    pub candidates: Vec<ReferralCandidate>,
    #[serde(default)]
    pub declined_provider_ids: Vec<Uuid>,
    /// Appointment booked from this referral, if any.
    pub appointment_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Accepted,
    Scheduled,
    InProgress,
    Completed,
    Declined,
    Cancelled,
    Unassigned,
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferralStatus::Pending => write!(f, "pending"),
            ReferralStatus::Accepted => write!(f, "accepted"),
            ReferralStatus::Scheduled => write!(f, "scheduled"),
            ReferralStatus::InProgress => write!(f, "in_progress"),
            ReferralStatus::Completed => write!(f, "completed"),
            ReferralStatus::Declined => write!(f, "declined"),
            ReferralStatus::Cancelled => write!(f, "cancelled"),
            ReferralStatus::Unassigned => write!(f, "unassigned"),
        }
    }
}

impl ReferralStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReferralStatus::Completed | ReferralStatus::Declined | ReferralStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: ReferralStatus) -> bool {
        use ReferralStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Declined)
                | (Pending, Cancelled)
                | (Pending, Unassigned)
                | (Accepted, Scheduled)
                | (Accepted, Cancelled)
                | (Scheduled, InProgress)
                | (Scheduled, Cancelled)
                | (InProgress, Completed)
                | (Unassigned, Pending)
                | (Unassigned, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferralUrgency {
    Urgent,
    High,
    Standard,
    Low,
}

impl fmt::Display for ReferralUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferralUrgency::Urgent => write!(f, "urgent"),
            ReferralUrgency::High => write!(f, "high"),
            ReferralUrgency::Standard => write!(f, "standard"),
            ReferralUrgency::Low => write!(f, "low"),
        }
    }
}

/// One ranked routing candidate, stored on the referral row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferralCandidate {
    pub provider_id: Uuid,
    pub rank: i32,
    /// Completed appointments this provider already had with the owner.
    pub prior_completed_with_owner: i64,
    pub years_of_experience: i32,
}

// ==============================================================================
// REQUEST / QUERY MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReferralRequest {
    pub owner_id: Uuid,
    pub pet_id: Uuid,
    pub required_specialty: String,
    pub urgency: ReferralUrgency,
    pub case_summary: String,
    /// Hours until the referral expires to `unassigned`; defaults to 72.
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeclineReferralRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignReferralRequest {
    pub provider_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleReferralRequest {
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub visit_address: String,
    pub visit_lat: Option<f64>,
    pub visit_lng: Option<f64>,
    pub owner_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralListQuery {
    pub status: Option<ReferralStatus>,
    pub clinic_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReferralError {
    #[error("Referral not found")]
    NotFound,

    #[error("No eligible providers for specialty {0}")]
    NoCandidates(String),

    #[error("Provider is not a candidate on this referral")]
    NotACandidate,

    #[error("Referral cannot move from {0} to {1}")]
    InvalidStatusTransition(ReferralStatus, ReferralStatus),

    #[error("Unauthorized access to referral")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Scheduling failed: {0}")]
    SchedulingFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referral_lifecycle_happy_path() {
        use ReferralStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn unassigned_can_be_reassigned() {
        assert!(ReferralStatus::Pending.can_transition_to(ReferralStatus::Unassigned));
        assert!(ReferralStatus::Unassigned.can_transition_to(ReferralStatus::Pending));
        assert!(ReferralStatus::Unassigned.can_transition_to(ReferralStatus::Cancelled));
    }

    #[test]
    fn terminal_states_reject_everything() {
        use ReferralStatus::*;
        for next in [
            Pending, Accepted, Scheduled, InProgress, Completed, Declined, Cancelled, Unassigned,
        ] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
            assert!(!Declined.can_transition_to(next));
        }
    }
}
