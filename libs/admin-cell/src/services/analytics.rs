use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AdminError, BreakdownEntry, DailyCount, ReferralFunnel, TopProvider, VerificationThroughput,
};
use crate::services::anomaly::group_by_day;

pub struct AnalyticsService {
    supabase: SupabaseClient,
}

impl AnalyticsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn appointments_per_day(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<DailyCount>, AdminError> {
        let rows = self
            .fetch_appointments(from, to, "scheduled_start_time", auth_token)
            .await?;

        let dates: Vec<NaiveDate> = rows
            .iter()
            .filter_map(|row| parse_timestamp(row, "scheduled_start_time"))
            .map(|t| t.date_naive())
            .collect();

        Ok(group_by_day(&dates, from.date_naive(), to.date_naive()))
    }

    pub async fn bookings_by_status(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<BreakdownEntry>, AdminError> {
        let rows = self
            .fetch_appointments(from, to, "scheduled_start_time,status", auth_token)
            .await?;
        Ok(count_by_field(&rows, "status"))
    }

    pub async fn bookings_by_type(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<BreakdownEntry>, AdminError> {
        let rows = self
            .fetch_appointments(from, to, "scheduled_start_time,visit_type", auth_token)
            .await?;
        Ok(count_by_field(&rows, "visit_type"))
    }

    pub async fn verification_throughput(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<VerificationThroughput, AdminError> {
        let path = format!(
            "/rest/v1/verification_requests?submitted_at=gte.{}&submitted_at=lte.{}&select=submitted_at,reviewed_at",
            from.to_rfc3339(),
            to.to_rfc3339()
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))?;

        let submitted: Vec<NaiveDate> = rows
            .iter()
            .filter_map(|row| parse_timestamp(row, "submitted_at"))
            .map(|t| t.date_naive())
            .collect();

        let decisions: Vec<(DateTime<Utc>, DateTime<Utc>)> = rows
            .iter()
            .filter_map(|row| {
                let submitted_at = parse_timestamp(row, "submitted_at")?;
                let reviewed_at = parse_timestamp(row, "reviewed_at")?;
                Some((submitted_at, reviewed_at))
            })
            .collect();

        let decided_dates: Vec<NaiveDate> =
            decisions.iter().map(|(_, r)| r.date_naive()).collect();

        Ok(VerificationThroughput {
            submitted_per_day: group_by_day(&submitted, from.date_naive(), to.date_naive()),
            decided_per_day: group_by_day(&decided_dates, from.date_naive(), to.date_naive()),
            mean_decision_hours: mean_decision_hours(&decisions),
        })
    }

    pub async fn referral_funnel(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<ReferralFunnel, AdminError> {
        let path = format!(
            "/rest/v1/referrals?created_at=gte.{}&created_at=lte.{}&select=status",
            from.to_rfc3339(),
            to.to_rfc3339()
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))?;

        let statuses: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.get("status").and_then(|v| v.as_str()))
            .collect();

        Ok(build_funnel(&statuses))
    }

    pub async fn top_providers(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        auth_token: &str,
    ) -> Result<Vec<TopProvider>, AdminError> {
        let path = format!(
            "/rest/v1/appointments?status=eq.completed&scheduled_start_time=gte.{}&scheduled_start_time=lte.{}&select=provider_id",
            from.to_rfc3339(),
            to.to_rfc3339()
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))?;

        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for row in &rows {
            if let Some(id) = row
                .get("provider_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Uuid>().ok())
            {
                *counts.entry(id).or_insert(0) += 1;
            }
        }

        let mut top: Vec<TopProvider> = counts
            .into_iter()
            .map(|(provider_id, completed_appointments)| TopProvider {
                provider_id,
                completed_appointments,
            })
            .collect();

        top.sort_by(|a, b| {
            b.completed_appointments
                .cmp(&a.completed_appointments)
                .then(a.provider_id.cmp(&b.provider_id))
        });
        top.truncate(limit);

        Ok(top)
    }

    async fn fetch_appointments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        select: &str,
        auth_token: &str,
    ) -> Result<Vec<Value>, AdminError> {
        let path = format!(
            "/rest/v1/appointments?scheduled_start_time=gte.{}&scheduled_start_time=lte.{}&select={}",
            from.to_rfc3339(),
            to.to_rfc3339(),
            select
        );

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))
    }
}

fn parse_timestamp(row: &Value, field: &str) -> Option<DateTime<Utc>> {
    row.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

/// Count rows per distinct value of a string field, sorted by count.
pub fn count_by_field(rows: &[Value], field: &str) -> Vec<BreakdownEntry> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for row in rows {
        if let Some(value) = row.get(field).and_then(|v| v.as_str()) {
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
    }

    let mut entries: Vec<BreakdownEntry> = counts
        .into_iter()
        .map(|(key, count)| BreakdownEntry { key, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.key.cmp(&b.key)));
    entries
}

/// Funnel stages are cumulative: a completed referral was also accepted and
/// scheduled along the way.
pub fn build_funnel(statuses: &[&str]) -> ReferralFunnel {
    let reached = |stages: &[&str]| {
        statuses
            .iter()
            .filter(|s| stages.contains(*s))
            .count() as i64
    };

    ReferralFunnel {
        created: statuses.len() as i64,
        accepted: reached(&["accepted", "scheduled", "in_progress", "completed"]),
        scheduled: reached(&["scheduled", "in_progress", "completed"]),
        completed: reached(&["completed"]),
    }
}

/// Mean hours from submission to decision, None when nothing was decided.
pub fn mean_decision_hours(decisions: &[(DateTime<Utc>, DateTime<Utc>)]) -> Option<f64> {
    if decisions.is_empty() {
        return None;
    }

    let total_seconds: i64 = decisions
        .iter()
        .map(|(submitted, reviewed)| (*reviewed - *submitted).num_seconds())
        .sum();

    Some(total_seconds as f64 / 3600.0 / decisions.len() as f64)
}
