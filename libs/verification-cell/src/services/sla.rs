use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{SlaStatus, VerificationPriority, VerificationRequest};

/// Fraction of the goal window after which a pending request shows At Risk.
const AT_RISK_FRACTION: f64 = 0.75;

#[derive(Debug, Clone, Serialize)]
pub struct SlaSnapshot {
    pub status: SlaStatus,
    pub elapsed_hours: f64,
    pub goal_hours: i64,
}

/// Derive the SLA label from the submission clock. Decided requests freeze
/// at Completed; everything else is measured against the priority goal.
pub fn derive_sla_status(
    priority: VerificationPriority,
    submitted_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SlaStatus {
    if reviewed_at.is_some() {
        return SlaStatus::Completed;
    }

    let goal_hours = priority.goal_hours() as f64;
    let elapsed_hours = (now - submitted_at).num_seconds() as f64 / 3600.0;

    if elapsed_hours > goal_hours {
        SlaStatus::Breached
    } else if elapsed_hours >= goal_hours * AT_RISK_FRACTION {
        SlaStatus::AtRisk
    } else {
        SlaStatus::OnTrack
    }
}

pub fn sla_snapshot(request: &VerificationRequest, now: DateTime<Utc>) -> SlaSnapshot {
    let reference = request.reviewed_at.unwrap_or(now);
    SlaSnapshot {
        status: derive_sla_status(request.priority, request.submitted_at, request.reviewed_at, now),
        elapsed_hours: (reference - request.submitted_at).num_seconds() as f64 / 3600.0,
        goal_hours: request.priority.goal_hours(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let submitted = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        (submitted, submitted + Duration::hours(h))
    }

    #[test]
    fn fresh_urgent_request_is_on_track() {
        let (submitted, now) = at(5);
        assert_eq!(
            derive_sla_status(VerificationPriority::Urgent, submitted, None, now),
            SlaStatus::OnTrack
        );
    }

    #[test]
    fn urgent_request_goes_at_risk_at_18_hours() {
        let (submitted, now) = at(18);
        assert_eq!(
            derive_sla_status(VerificationPriority::Urgent, submitted, None, now),
            SlaStatus::AtRisk
        );
    }

    #[test]
    fn urgent_request_breaches_past_24_hours() {
        let (submitted, now) = at(25);
        assert_eq!(
            derive_sla_status(VerificationPriority::Urgent, submitted, None, now),
            SlaStatus::Breached
        );
    }

    #[test]
    fn decided_requests_freeze_at_completed() {
        let (submitted, now) = at(500);
        let reviewed = submitted + Duration::hours(10);
        assert_eq!(
            derive_sla_status(VerificationPriority::Low, submitted, Some(reviewed), now),
            SlaStatus::Completed
        );
    }

    #[test]
    fn standard_priority_uses_72_hour_goal() {
        let (submitted, now) = at(53);
        // 53h < 54h (75% of 72) keeps it on track
        assert_eq!(
            derive_sla_status(VerificationPriority::Standard, submitted, None, now),
            SlaStatus::OnTrack
        );

        let (submitted, now) = at(54);
        assert_eq!(
            derive_sla_status(VerificationPriority::Standard, submitted, None, now),
            SlaStatus::AtRisk
        );
    }
}
