use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Notification, NotificationError, NotificationKind, NotificationListQuery};
use crate::services::dispatch::MessagingClient;

pub struct NotificationService {
    supabase: SupabaseClient,
    messaging: MessagingClient,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            messaging: MessagingClient::new(config),
        }
    }

    /// Record an in-app notification and best-effort dispatch an email and an
    /// SMS to whatever contact details the account carries. The write is the
    /// source of truth; dispatch failure never bubbles up.
    pub async fn record(
        &self,
        recipient_id: Uuid,
        kind: NotificationKind,
        title: &str,
        body: &str,
        related_entity_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        debug!("Recording {} notification for {}", kind, recipient_id);

        let notification_data = json!({
            "recipient_id": recipient_id,
            "kind": kind,
            "title": title,
            "body": body,
            "related_entity_id": related_entity_id,
            "is_read": false,
            "created_at": Utc::now().to_rfc3339()
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
                "/rest/v1/notifications",
                Some(auth_token),
                Some(notification_data),
                Some(headers),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let notification: Notification = result
            .into_iter()
            .next()
            .ok_or_else(|| {
                NotificationError::DatabaseError("Failed to create notification".to_string())
            })
            .and_then(|row| {
                serde_json::from_value(row).map_err(|e| {
                    NotificationError::DatabaseError(format!("Failed to parse notification: {}", e))
                })
            })?;

        let (email, phone) = self.lookup_contact(recipient_id, auth_token).await;
        if let Some(email) = email {
            if let Err(e) = self.messaging.send_email(&email, title, body).await {
                warn!("Email dispatch failed for {}: {}", recipient_id, e);
            }
        }
        if let Some(phone) = phone {
            if let Err(e) = self.messaging.send_sms(&phone, body).await {
                warn!("SMS dispatch failed for {}: {}", recipient_id, e);
            }
        }

        Ok(notification)
    }

    pub async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        query: &NotificationListQuery,
        auth_token: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut query_parts = vec![format!("recipient_id=eq.{}", recipient_id)];

        if query.unread_only.unwrap_or(false) {
            query_parts.push("is_read=eq.false".to_string());
        }

        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let path = format!(
            "/rest/v1/notifications?{}&order=created_at.desc&limit={}",
            query_parts.join("&"),
            limit
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                NotificationError::DatabaseError(format!("Failed to parse notifications: {}", e))
            })
    }

    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        let path = format!(
            "/rest/v1/notifications?id=eq.{}&recipient_id=eq.{}",
            notification_id, recipient_id
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "is_read": true })),
                Some(headers),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(NotificationError::NotFound)
            .and_then(|row| {
                serde_json::from_value(row).map_err(|e| {
                    NotificationError::DatabaseError(format!("Failed to parse notification: {}", e))
                })
            })
    }

    pub async fn mark_all_read(
        &self,
        recipient_id: Uuid,
        auth_token: &str,
    ) -> Result<usize, NotificationError> {
        let path = format!(
            "/rest/v1/notifications?recipient_id=eq.{}&is_read=eq.false",
            recipient_id
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "is_read": true })),
                Some(headers),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        Ok(result.len())
    }

    /// Sweep appointments starting within the next `hours_ahead` hours and
    /// record a reminder for each owner. Intended to be hit by a scheduler;
    /// returns how many reminders were recorded.
    pub async fn send_upcoming_reminders(
        &self,
        hours_ahead: i64,
        auth_token: &str,
    ) -> Result<usize, NotificationError> {
        let now = Utc::now();
        let until = now + chrono::Duration::hours(hours_ahead.clamp(1, 72));

        let path = format!(
            "/rest/v1/appointments?status=in.(pending,confirmed)&scheduled_start_time=gte.{}&scheduled_start_time=lte.{}&select=id,owner_id,scheduled_start_time",
            now.to_rfc3339(),
            until.to_rfc3339()
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let mut sent = 0;
        for row in rows {
            let appointment_id = row
                .get("id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Uuid>().ok());
            let owner_id = row
                .get("owner_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Uuid>().ok());
            let starts = row
                .get("scheduled_start_time")
                .and_then(|v| v.as_str())
                .unwrap_or("soon");

            if let (Some(appointment_id), Some(owner_id)) = (appointment_id, owner_id) {
                let body = format!("You have an appointment coming up at {}.", starts);
                if self
                    .record(
                        owner_id,
                        NotificationKind::AppointmentReminder,
                        "Upcoming appointment",
                        &body,
                        Some(appointment_id),
                        auth_token,
                    )
                    .await
                    .is_ok()
                {
                    sent += 1;
                }
            }
        }

        Ok(sent)
    }

    async fn lookup_contact(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> (Option<String>, Option<String>) {
        match self.supabase.get_account(&user_id.to_string(), auth_token).await {
            Ok(account) => {
                let email = account
                    .get("email")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let phone = account
                    .get("phone")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                (email, phone)
            }
            Err(e) => {
                debug!("Could not look up contact details for {}: {}", user_id, e);
                (None, None)
            }
        }
    }

    // ==========================================================================
    // EVENT HELPERS USED BY OTHER CELLS
    // ==========================================================================

    pub async fn appointment_booked(
        &self,
        provider_user_id: Uuid,
        appointment_id: Uuid,
        pet_name: &str,
        auth_token: &str,
    ) {
        let body = format!("A new visit for {} has been requested.", pet_name);
        if let Err(e) = self
            .record(
                provider_user_id,
                NotificationKind::AppointmentBooked,
                "New appointment request",
                &body,
                Some(appointment_id),
                auth_token,
            )
            .await
        {
            warn!("Failed to record booking notification: {}", e);
        }
    }

    pub async fn appointment_confirmed(
        &self,
        owner_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) {
        if let Err(e) = self
            .record(
                owner_id,
                NotificationKind::AppointmentConfirmed,
                "Appointment confirmed",
                "Your provider has confirmed the visit.",
                Some(appointment_id),
                auth_token,
            )
            .await
        {
            warn!("Failed to record confirmation notification: {}", e);
        }
    }

    pub async fn appointment_cancelled(
        &self,
        recipient_id: Uuid,
        appointment_id: Uuid,
        reason: &str,
        auth_token: &str,
    ) {
        let body = format!("The appointment was cancelled: {}", reason);
        if let Err(e) = self
            .record(
                recipient_id,
                NotificationKind::AppointmentCancelled,
                "Appointment cancelled",
                &body,
                Some(appointment_id),
                auth_token,
            )
            .await
        {
            warn!("Failed to record cancellation notification: {}", e);
        }
    }

    pub async fn verification_decided(
        &self,
        provider_user_id: Uuid,
        request_id: Uuid,
        approved: bool,
        auth_token: &str,
    ) {
        let body = if approved {
            "Your verification request was approved. You can now accept bookings.".to_string()
        } else {
            "Your verification request was rejected. See review notes for details.".to_string()
        };
        if let Err(e) = self
            .record(
                provider_user_id,
                NotificationKind::VerificationDecided,
                "Verification decision",
                &body,
                Some(request_id),
                auth_token,
            )
            .await
        {
            warn!("Failed to record verification notification: {}", e);
        }
    }

    pub async fn account_moderated(
        &self,
        user_id: Uuid,
        suspended: bool,
        reason: &str,
        auth_token: &str,
    ) {
        let (title, body) = if suspended {
            (
                "Account suspended",
                format!("Your account has been suspended: {}", reason),
            )
        } else {
            (
                "Account reinstated",
                format!("Your account has been reinstated: {}", reason),
            )
        };
        if let Err(e) = self
            .record(
                user_id,
                NotificationKind::AccountModerated,
                title,
                &body,
                None,
                auth_token,
            )
            .await
        {
            warn!("Failed to record moderation notification: {}", e);
        }
    }

    pub async fn referral_assigned(
        &self,
        provider_user_id: Uuid,
        referral_id: Uuid,
        specialty: &str,
        auth_token: &str,
    ) {
        let body = format!("You have been matched to a {} referral.", specialty);
        if let Err(e) = self
            .record(
                provider_user_id,
                NotificationKind::ReferralAssigned,
                "New referral",
                &body,
                Some(referral_id),
                auth_token,
            )
            .await
        {
            warn!("Failed to record referral notification: {}", e);
        }
    }
}
