use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub related_entity_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentBooked,
    AppointmentConfirmed,
    AppointmentCancelled,
    AppointmentReminder,
    VerificationDecided,
    ReferralAssigned,
    AccountModerated,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::AppointmentBooked => write!(f, "appointment_booked"),
            NotificationKind::AppointmentConfirmed => write!(f, "appointment_confirmed"),
            NotificationKind::AppointmentCancelled => write!(f, "appointment_cancelled"),
            NotificationKind::AppointmentReminder => write!(f, "appointment_reminder"),
            NotificationKind::VerificationDecided => write!(f, "verification_decided"),
            NotificationKind::ReferralAssigned => write!(f, "referral_assigned"),
            NotificationKind::AccountModerated => write!(f, "account_moderated"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationListQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderSweepQuery {
    pub hours_ahead: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
