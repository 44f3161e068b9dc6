use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// MODERATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Suspend,
    Reinstate,
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationAction::Suspend => write!(f, "suspend"),
            ModerationAction::Reinstate => write!(f, "reinstate"),
        }
    }
}

/// One entry in a user's moderation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: ModerationAction,
    pub reason: String,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationRequest {
    pub reason: String,
}

// ==============================================================================
// ANALYTICS MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeQuery {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakdownEntry {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationThroughput {
    pub submitted_per_day: Vec<DailyCount>,
    pub decided_per_day: Vec<DailyCount>,
    pub mean_decision_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralFunnel {
    pub created: i64,
    pub accepted: i64,
    pub scheduled: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopProvider {
    pub provider_id: Uuid,
    pub completed_appointments: i64,
}

// ==============================================================================
// ANOMALY MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyDirection {
    Spike,
    Drop,
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub count: i64,
    pub mean: f64,
    pub stddev: f64,
    pub direction: AnomalyDirection,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub window_days: i64,
    pub bookings: Vec<Anomaly>,
    pub cancellations: Vec<Anomaly>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyQuery {
    /// Trailing window length in days; defaults to 30.
    pub window_days: Option<i64>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Account not found")]
    AccountNotFound,

    #[error("Account is already {0}")]
    AlreadyInState(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
