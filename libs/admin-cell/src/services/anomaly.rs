use chrono::{Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AdminError, Anomaly, AnomalyDirection, AnomalyReport, DailyCount};

/// Days with |count - mean| beyond this many standard deviations are flagged.
const SIGMA_THRESHOLD: f64 = 2.0;
/// Quiet marketplaces have tiny deviations; the floor keeps single-booking
/// days from tripping the detector.
const SIGMA_FLOOR: f64 = 1.0;

pub struct AnomalyDetectionService {
    supabase: SupabaseClient,
}

impl AnomalyDetectionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Scan daily booking and cancellation counts over a trailing window.
    pub async fn detect(
        &self,
        window_days: i64,
        auth_token: &str,
    ) -> Result<AnomalyReport, AdminError> {
        let window_days = window_days.clamp(7, 365);
        let today = Utc::now().date_naive();
        let window_start = today - Duration::days(window_days - 1);

        let bookings = self
            .daily_counts("created_at", None, window_start, auth_token)
            .await?;
        let cancellations = self
            .daily_counts("updated_at", Some("status=eq.cancelled"), window_start, auth_token)
            .await?;

        debug!(
            "Anomaly scan over {} days: {} booking days, {} cancellation days",
            window_days,
            bookings.len(),
            cancellations.len()
        );

        Ok(AnomalyReport {
            window_days,
            bookings: detect_anomalies(&bookings),
            cancellations: detect_anomalies(&cancellations),
        })
    }

    async fn daily_counts(
        &self,
        timestamp_column: &str,
        extra_filter: Option<&str>,
        window_start: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<DailyCount>, AdminError> {
        let mut parts = vec![
            format!(
                "{}=gte.{}",
                timestamp_column,
                window_start
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or_default()
                    .and_utc()
                    .to_rfc3339()
            ),
            format!("select={}", timestamp_column),
        ];
        if let Some(filter) = extra_filter {
            parts.push(filter.to_string());
        }

        let path = format!("/rest/v1/appointments?{}", parts.join("&"));

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))?;

        let dates: Vec<NaiveDate> = rows
            .iter()
            .filter_map(|row| {
                row.get(timestamp_column)
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<chrono::DateTime<Utc>>().ok())
                    .map(|t| t.date_naive())
            })
            .collect();

        Ok(group_by_day(&dates, window_start, Utc::now().date_naive()))
    }
}

/// Count events per day, filling empty days with zero so quiet days can be
/// flagged as drops.
pub fn group_by_day(dates: &[NaiveDate], from: NaiveDate, to: NaiveDate) -> Vec<DailyCount> {
    let mut counts = Vec::new();
    let mut day = from;
    while day <= to {
        let count = dates.iter().filter(|d| **d == day).count() as i64;
        counts.push(DailyCount { date: day, count });
        day += Duration::days(1);
    }
    counts
}

/// Flag days deviating from the window mean by more than two standard
/// deviations, with a floor on sigma.
pub fn detect_anomalies(daily: &[DailyCount]) -> Vec<Anomaly> {
    if daily.is_empty() {
        return Vec::new();
    }

    let n = daily.len() as f64;
    let mean = daily.iter().map(|d| d.count as f64).sum::<f64>() / n;
    let variance = daily
        .iter()
        .map(|d| {
            let diff = d.count as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    let stddev = variance.sqrt().max(SIGMA_FLOOR);

    daily
        .iter()
        .filter(|d| (d.count as f64 - mean).abs() > SIGMA_THRESHOLD * stddev)
        .map(|d| Anomaly {
            date: d.date,
            count: d.count,
            mean,
            stddev,
            direction: if (d.count as f64) > mean {
                AnomalyDirection::Spike
            } else {
                AnomalyDirection::Drop
            },
        })
        .collect()
}
