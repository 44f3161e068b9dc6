use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityOverride, AvailabilityRule, BookableSlot, BookedInterval,
    CreateAvailabilityRequest, CreateOverrideRequest, ProviderError, UpdateAvailabilityRequest,
};

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_rule(
        &self,
        provider_id: Uuid,
        request: CreateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<AvailabilityRule, ProviderError> {
        debug!("Creating availability rule for provider {}", provider_id);

        validate_rule_window(request.start_time, request.end_time, request.slot_minutes)?;

        if !(0..=6).contains(&request.day_of_week) {
            return Err(ProviderError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        let existing = self
            .rules_for_day(provider_id, request.day_of_week, auth_token)
            .await?;

        let same_day: Vec<&AvailabilityRule> = existing
            .iter()
            .filter(|r| rules_share_a_day(r.specific_date, request.specific_date))
            .collect();

        for rule in same_day {
            if windows_overlap(request.start_time, request.end_time, rule.start_time, rule.end_time)
            {
                warn!(
                    "Availability overlap for provider {} on day {}",
                    provider_id, request.day_of_week
                );
                return Err(ProviderError::AvailabilityOverlap);
            }
        }

        let now = Utc::now().to_rfc3339();
        let rule_data = json!({
            "provider_id": provider_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "slot_minutes": request.slot_minutes,
            "buffer_minutes": request.buffer_minutes.unwrap_or(15),
            "is_recurring": request.is_recurring.unwrap_or(true),
            "specific_date": request.specific_date,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self
            .insert_returning("/rest/v1/provider_availability", rule_data, auth_token)
            .await?;

        parse_single_rule(result)
    }

    pub async fn update_rule(
        &self,
        rule_id: Uuid,
        request: UpdateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<AvailabilityRule, ProviderError> {
        debug!("Updating availability rule {}", rule_id);

        let current = self.get_rule(rule_id, auth_token).await?;

        let start = request.start_time.unwrap_or(current.start_time);
        let end = request.end_time.unwrap_or(current.end_time);
        let slot_minutes = request.slot_minutes.unwrap_or(current.slot_minutes);

        validate_rule_window(start, end, slot_minutes)?;

        let existing = self
            .rules_for_day(current.provider_id, current.day_of_week, auth_token)
            .await?;

        for rule in existing
            .iter()
            .filter(|r| r.id != rule_id && rules_share_a_day(r.specific_date, current.specific_date))
        {
            if windows_overlap(start, end, rule.start_time, rule.end_time) {
                return Err(ProviderError::AvailabilityOverlap);
            }
        }

        let update = json!({
            "start_time": start.format("%H:%M:%S").to_string(),
            "end_time": end.format("%H:%M:%S").to_string(),
            "slot_minutes": slot_minutes,
            "buffer_minutes": request.buffer_minutes.unwrap_or(current.buffer_minutes),
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/provider_availability?id=eq.{}", rule_id);
        let result: Vec<Value> = self.patch_returning(&path, update, auth_token).await?;

        parse_single_rule(result)
    }

    pub async fn delete_rule(&self, rule_id: Uuid, auth_token: &str) -> Result<(), ProviderError> {
        let path = format!("/rest/v1/provider_availability?id=eq.{}", rule_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if deleted.is_empty() {
            return Err(ProviderError::AvailabilityNotFound);
        }

        Ok(())
    }

    pub async fn get_rule(
        &self,
        rule_id: Uuid,
        auth_token: &str,
    ) -> Result<AvailabilityRule, ProviderError> {
        let path = format!("/rest/v1/provider_availability?id=eq.{}", rule_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        parse_single_rule(result)
    }

    pub async fn list_rules(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityRule>, ProviderError> {
        let path = format!(
            "/rest/v1/provider_availability?provider_id=eq.{}&order=day_of_week.asc,start_time.asc",
            provider_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse rules: {}", e)))
    }

    pub async fn create_override(
        &self,
        provider_id: Uuid,
        request: CreateOverrideRequest,
        auth_token: &str,
    ) -> Result<AvailabilityOverride, ProviderError> {
        debug!("Creating availability override for provider {}", provider_id);

        let full_day = request.full_day.unwrap_or(true);
        if !full_day {
            match (request.start_time, request.end_time) {
                (Some(start), Some(end)) if start < end => {}
                _ => {
                    return Err(ProviderError::ValidationError(
                        "Partial-day override requires start_time before end_time".to_string(),
                    ))
                }
            }
        }

        let override_data = json!({
            "provider_id": provider_id,
            "date": request.date,
            "full_day": full_day,
            "start_time": request.start_time.map(|t| t.format("%H:%M:%S").to_string()),
            "end_time": request.end_time.map(|t| t.format("%H:%M:%S").to_string()),
            "reason": request.reason,
            "created_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self
            .insert_returning("/rest/v1/availability_overrides", override_data, auth_token)
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::DatabaseError("Failed to create override".to_string()))?;
        serde_json::from_value(row)
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse override: {}", e)))
    }

    pub async fn list_overrides(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityOverride>, ProviderError> {
        let path = format!(
            "/rest/v1/availability_overrides?provider_id=eq.{}&order=date.asc",
            provider_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse overrides: {}", e)))
    }

    /// Bookable slots for one date: expand matching rules, subtract overrides
    /// and already-booked active appointments.
    pub async fn compute_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookableSlot>, ProviderError> {
        let rules = self.list_rules(provider_id, auth_token).await?;
        let overrides = self.overrides_for_date(provider_id, date, auth_token).await?;
        let booked = self.booked_intervals_for_date(provider_id, date, auth_token).await?;

        Ok(expand_day_slots(&rules, &overrides, &booked, date))
    }

    async fn rules_for_day(
        &self,
        provider_id: Uuid,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityRule>, ProviderError> {
        let path = format!(
            "/rest/v1/provider_availability?provider_id=eq.{}&day_of_week=eq.{}",
            provider_id, day_of_week
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse rules: {}", e)))
    }

    async fn overrides_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityOverride>, ProviderError> {
        let path = format!(
            "/rest/v1/availability_overrides?provider_id=eq.{}&date=eq.{}",
            provider_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse overrides: {}", e)))
    }

    async fn booked_intervals_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedInterval>, ProviderError> {
        let day_start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let day_end = day_start + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&scheduled_start_time=gte.{}&scheduled_start_time=lt.{}&status=in.(pending,confirmed,in_progress)&select=scheduled_start_time,scheduled_end_time,status",
            provider_id,
            day_start.to_rfc3339(),
            day_end.to_rfc3339()
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse intervals: {}", e)))
    }

    async fn insert_returning(
        &self,
        path: &str,
        body: Value,
        auth_token: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        self.supabase
            .request_with_headers(Method::POST, path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))
    }

    async fn patch_returning(
        &self,
        path: &str,
        body: Value,
        auth_token: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        self.supabase
            .request_with_headers(Method::PATCH, path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))
    }
}

fn validate_rule_window(
    start: NaiveTime,
    end: NaiveTime,
    slot_minutes: i32,
) -> Result<(), ProviderError> {
    if start >= end {
        return Err(ProviderError::ValidationError(
            "Start time must be before end time".to_string(),
        ));
    }
    if slot_minutes < 5 || slot_minutes > 240 {
        return Err(ProviderError::ValidationError(
            "Slot length must be between 5 and 240 minutes".to_string(),
        ));
    }
    Ok(())
}

fn parse_single_rule(rows: Vec<Value>) -> Result<AvailabilityRule, ProviderError> {
    let row = rows
        .into_iter()
        .next()
        .ok_or(ProviderError::AvailabilityNotFound)?;
    serde_json::from_value(row)
        .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse rule: {}", e)))
}

/// Two rules fetched for the same weekday can only stay apart when both are
/// pinned to different dates; a recurring rule meets every pinned rule on
/// that weekday.
pub fn rules_share_a_day(a: Option<NaiveDate>, b: Option<NaiveDate>) -> bool {
    match (a, b) {
        (Some(first), Some(second)) => first == second,
        _ => true,
    }
}

pub fn windows_overlap(
    start1: NaiveTime,
    end1: NaiveTime,
    start2: NaiveTime,
    end2: NaiveTime,
) -> bool {
    start1 < end2 && start2 < end1
}

/// Expand the rules that apply to `date` into concrete slots, then drop any
/// slot blocked by an override or an active appointment.
pub fn expand_day_slots(
    rules: &[AvailabilityRule],
    overrides: &[AvailabilityOverride],
    booked: &[BookedInterval],
    date: NaiveDate,
) -> Vec<BookableSlot> {
    let weekday = date.weekday().num_days_from_sunday() as i32;

    let mut slots = Vec::new();

    for rule in rules {
        let applies = match rule.specific_date {
            Some(pinned) => pinned == date,
            None => rule.is_recurring && rule.day_of_week == weekday,
        };
        if !applies {
            continue;
        }

        let step = Duration::minutes((rule.slot_minutes + rule.buffer_minutes) as i64);
        let slot_len = Duration::minutes(rule.slot_minutes as i64);

        let mut cursor = date.and_time(rule.start_time).and_utc();
        let window_end = date.and_time(rule.end_time).and_utc();

        while cursor + slot_len <= window_end {
            let slot = BookableSlot {
                start_time: cursor,
                end_time: cursor + slot_len,
            };

            if !slot_blocked(&slot, overrides, booked, date) {
                slots.push(slot);
            }

            cursor += step;
        }
    }

    slots.sort_by_key(|s| s.start_time);
    slots.dedup();
    slots
}

fn slot_blocked(
    slot: &BookableSlot,
    overrides: &[AvailabilityOverride],
    booked: &[BookedInterval],
    date: NaiveDate,
) -> bool {
    for ov in overrides.iter().filter(|o| o.date == date) {
        if ov.full_day {
            return true;
        }
        if let (Some(start), Some(end)) = (ov.start_time, ov.end_time) {
            let block_start = date.and_time(start).and_utc();
            let block_end = date.and_time(end).and_utc();
            if slot.start_time < block_end && block_start < slot.end_time {
                return true;
            }
        }
    }

    booked.iter().any(|b| {
        slot.start_time < b.scheduled_end_time && b.scheduled_start_time < slot.end_time
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rule(day: i32, start: (u32, u32), end: (u32, u32), slot: i32, buffer: i32) -> AvailabilityRule {
        AvailabilityRule {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            slot_minutes: slot,
            buffer_minutes: buffer,
            is_recurring: true,
            specific_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn overlapping_windows_detected() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let half_nine = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let eleven = NaiveTime::from_hms_opt(11, 0, 0).unwrap();

        assert!(windows_overlap(nine, ten, half_nine, eleven));
        assert!(!windows_overlap(nine, ten, ten, eleven));
    }

    #[test]
    fn one_off_window_inside_a_recurring_window_counts_as_overlap() {
        let monday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let recurring = rule(1, (9, 0), (12, 0), 30, 0);

        let mut one_off = rule(1, (9, 30), (11, 30), 30, 0);
        one_off.is_recurring = false;
        one_off.specific_date = Some(monday);

        assert!(rules_share_a_day(recurring.specific_date, one_off.specific_date));
        assert!(windows_overlap(
            one_off.start_time,
            one_off.end_time,
            recurring.start_time,
            recurring.end_time
        ));
    }

    #[test]
    fn only_rules_pinned_to_different_dates_stay_apart() {
        let monday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let next_monday = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();

        assert!(rules_share_a_day(None, None));
        assert!(rules_share_a_day(None, Some(monday)));
        assert!(rules_share_a_day(Some(monday), None));
        assert!(rules_share_a_day(Some(monday), Some(monday)));
        assert!(!rules_share_a_day(Some(monday), Some(next_monday)));
    }

    #[test]
    fn single_rule_rows_parse_and_empty_means_not_found() {
        assert!(matches!(
            parse_single_rule(vec![]),
            Err(ProviderError::AvailabilityNotFound)
        ));

        let row = serde_json::to_value(rule(1, (9, 0), (11, 0), 30, 0)).unwrap();
        let parsed = parse_single_rule(vec![row]).unwrap();
        assert_eq!(parsed.day_of_week, 1);
    }

    #[test]
    fn recurring_rule_expands_on_matching_weekday() {
        // 2025-06-02 is a Monday (weekday index 1)
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let rules = vec![rule(1, (9, 0), (11, 0), 30, 0)];

        let slots = expand_day_slots(&rules, &[], &[], date);
        assert_eq!(slots.len(), 4);
        assert_eq!(
            slots[0].start_time,
            Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn rule_for_other_weekday_yields_nothing() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(); // Monday
        let rules = vec![rule(3, (9, 0), (11, 0), 30, 0)];

        assert!(expand_day_slots(&rules, &[], &[], date).is_empty());
    }

    #[test]
    fn buffer_minutes_widen_slot_spacing() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let rules = vec![rule(1, (9, 0), (11, 0), 30, 30)];

        // 9:00 and 10:00 fit; the 11:00 slot would end past the window
        let slots = expand_day_slots(&rules, &[], &[], date);
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn full_day_override_blocks_everything() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let rules = vec![rule(1, (9, 0), (17, 0), 60, 0)];
        let overrides = vec![AvailabilityOverride {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            date,
            full_day: true,
            start_time: None,
            end_time: None,
            reason: Some("vacation".to_string()),
            created_at: Utc::now(),
        }];

        assert!(expand_day_slots(&rules, &overrides, &[], date).is_empty());
    }

    #[test]
    fn booked_interval_removes_overlapping_slot() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let rules = vec![rule(1, (9, 0), (12, 0), 60, 0)];
        let booked = vec![BookedInterval {
            scheduled_start_time: Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
            scheduled_end_time: Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap(),
            status: "confirmed".to_string(),
        }];

        let slots = expand_day_slots(&rules, &[], &booked, date);
        assert_eq!(slots.len(), 2);
        assert!(slots
            .iter()
            .all(|s| s.start_time.time() != NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
    }

    #[test]
    fn date_pinned_rule_only_fires_on_that_date() {
        let pinned = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        let mut one_off = rule(2, (14, 0), (16, 0), 60, 0);
        one_off.is_recurring = false;
        one_off.specific_date = Some(pinned);

        let rules = vec![one_off];
        assert_eq!(expand_day_slots(&rules, &[], &[], pinned).len(), 2);

        let other_tuesday = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        assert!(expand_day_slots(&rules, &[], &[], other_tuesday).is_empty());
    }
}
