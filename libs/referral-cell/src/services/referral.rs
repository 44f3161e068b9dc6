use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use appointment_cell::models::{BookAppointmentRequest, VisitType};
use appointment_cell::services::booking::AppointmentBookingService;

use notification_cell::services::notify::NotificationService;

use provider_cell::services::profile::ProviderProfileService;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AssignReferralRequest, CreateReferralRequest, Referral, ReferralError, ReferralListQuery,
    ReferralStatus, ScheduleReferralRequest,
};
use crate::services::routing::ReferralRoutingService;

pub struct ReferralService {
    supabase: SupabaseClient,
    routing: ReferralRoutingService,
    profiles: ProviderProfileService,
    booking: AppointmentBookingService,
    notifications: NotificationService,
}

impl ReferralService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            routing: ReferralRoutingService::new(config),
            profiles: ProviderProfileService::new(config),
            booking: AppointmentBookingService::new(config),
            notifications: NotificationService::new(config),
        }
    }

    pub async fn create_referral(
        &self,
        clinic_id: Uuid,
        request: CreateReferralRequest,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        if request.required_specialty.trim().is_empty() {
            return Err(ReferralError::ValidationError(
                "Required specialty cannot be empty".to_string(),
            ));
        }
        if request.case_summary.trim().is_empty() {
            return Err(ReferralError::ValidationError(
                "Case summary cannot be empty".to_string(),
            ));
        }

        let candidates = self
            .routing
            .rank_candidates_for(&request.required_specialty, request.owner_id, auth_token)
            .await?;

        let expires_in = request.expires_in_hours.unwrap_or(72).clamp(1, 24 * 14);
        let expires_at = Utc::now() + Duration::hours(expires_in);

        let body = json!({
            "clinic_id": clinic_id,
            "owner_id": request.owner_id,
            "pet_id": request.pet_id,
            "required_specialty": request.required_specialty.trim(),
            "urgency": request.urgency,
            "case_summary": request.case_summary.trim(),
            "status": "pending",
            "candidates": candidates,
            "declined_provider_ids": [],
            "expires_at": expires_at.to_rfc3339(),
        });

        let referral = self.insert_returning(body, auth_token).await?;

        // Top candidate hears about it right away
        if let Some(top) = referral.candidates.first() {
            if let Ok(profile) = self.profiles.get_profile(top.provider_id, auth_token).await {
                self.notifications
                    .referral_assigned(
                        profile.user_id,
                        referral.id,
                        &referral.required_specialty,
                        auth_token,
                    )
                    .await;
            }
        }

        info!(
            "Referral {} created with {} candidates",
            referral.id,
            referral.candidates.len()
        );

        Ok(referral)
    }

    pub async fn get_referral(
        &self,
        referral_id: Uuid,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        let referral = self.fetch(referral_id, auth_token).await?;
        self.expire_if_due(referral, auth_token).await
    }

    pub async fn list_referrals(
        &self,
        query: &ReferralListQuery,
        auth_token: &str,
    ) -> Result<Vec<Referral>, ReferralError> {
        let mut parts = Vec::new();
        if let Some(status) = query.status {
            parts.push(format!("status=eq.{}", status));
        }
        if let Some(clinic_id) = query.clinic_id {
            parts.push(format!("clinic_id=eq.{}", clinic_id));
        }
        if let Some(provider_id) = query.provider_id {
            parts.push(format!("provider_id=eq.{}", provider_id));
        }
        if let Some(owner_id) = query.owner_id {
            parts.push(format!("owner_id=eq.{}", owner_id));
        }

        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let offset = query.offset.unwrap_or(0).max(0);
        parts.push(format!("limit={}", limit));
        parts.push(format!("offset={}", offset));
        parts.push("order=created_at.desc".to_string());

        let path = format!("/rest/v1/referrals?{}", parts.join("&"));

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ReferralError::DatabaseError(e.to_string()))?;

        parse_referrals(rows)
    }

    /// Referrals awaiting a response from this provider.
    pub async fn pending_for_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Referral>, ReferralError> {
        let path = format!(
            "/rest/v1/referrals?status=eq.pending&candidates=cs.{}&order=created_at.asc",
            urlencoding::encode(&format!("[{{\"provider_id\":\"{}\"}}]", provider_id))
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ReferralError::DatabaseError(e.to_string()))?;

        let referrals = parse_referrals(rows)?;

        // Providers who already declined drop out of their own queue
        Ok(referrals
            .into_iter()
            .filter(|r| !r.declined_provider_ids.contains(&provider_id))
            .collect())
    }

    pub async fn accept(
        &self,
        referral_id: Uuid,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        let referral = self.get_referral(referral_id, auth_token).await?;

        ensure_transition(referral.status, ReferralStatus::Accepted)?;

        if !referral
            .candidates
            .iter()
            .any(|c| c.provider_id == provider_id)
        {
            return Err(ReferralError::NotACandidate);
        }
        if referral.declined_provider_ids.contains(&provider_id) {
            return Err(ReferralError::NotACandidate);
        }

        let update = json!({
            "status": "accepted",
            "provider_id": provider_id,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let updated = self.patch(referral_id, update, auth_token).await?;
        info!("Referral {} accepted by provider {}", referral_id, provider_id);
        Ok(updated)
    }

    pub async fn decline(
        &self,
        referral_id: Uuid,
        provider_id: Uuid,
        reason: Option<&str>,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        let referral = self.get_referral(referral_id, auth_token).await?;

        if referral.status != ReferralStatus::Pending {
            return Err(ReferralError::InvalidStatusTransition(
                referral.status,
                ReferralStatus::Declined,
            ));
        }
        if !referral
            .candidates
            .iter()
            .any(|c| c.provider_id == provider_id)
        {
            return Err(ReferralError::NotACandidate);
        }

        let mut declined = referral.declined_provider_ids.clone();
        if !declined.contains(&provider_id) {
            declined.push(provider_id);
        }

        let everyone_declined = referral
            .candidates
            .iter()
            .all(|c| declined.contains(&c.provider_id));

        let next_status = if everyone_declined {
            ReferralStatus::Unassigned
        } else {
            ReferralStatus::Pending
        };

        let update = json!({
            "status": next_status,
            "declined_provider_ids": declined,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let updated = self.patch(referral_id, update, auth_token).await?;

        info!(
            "Provider {} declined referral {}{}",
            provider_id,
            referral_id,
            reason.map(|r| format!(": {}", r)).unwrap_or_default()
        );
        if everyone_declined {
            warn!("Referral {} unassigned after all candidates declined", referral_id);
        }

        Ok(updated)
    }

    /// Manual admin assignment of an unassigned referral. The referral goes
    /// back to pending with the chosen provider as its only candidate.
    pub async fn assign(
        &self,
        referral_id: Uuid,
        request: AssignReferralRequest,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        let referral = self.get_referral(referral_id, auth_token).await?;

        ensure_transition(referral.status, ReferralStatus::Pending)?;

        let profile = self
            .profiles
            .get_profile(request.provider_id, auth_token)
            .await
            .map_err(|e| ReferralError::DatabaseError(e.to_string()))?;

        if !profile.is_active || !profile.is_verified {
            return Err(ReferralError::ValidationError(
                "Assigned provider must be active and verified".to_string(),
            ));
        }

        let candidate = json!([{
            "provider_id": request.provider_id,
            "rank": 1,
            "prior_completed_with_owner": 0,
            "years_of_experience": profile.years_of_experience,
        }]);

        let update = json!({
            "status": "pending",
            "candidates": candidate,
            "declined_provider_ids": [],
            "updated_at": Utc::now().to_rfc3339(),
        });

        let updated = self.patch(referral_id, update, auth_token).await?;

        self.notifications
            .referral_assigned(
                profile.user_id,
                referral_id,
                &updated.required_specialty,
                auth_token,
            )
            .await;

        Ok(updated)
    }

    /// Book the appointment for an accepted referral; the booking runs the
    /// full availability and conflict pipeline.
    pub async fn schedule(
        &self,
        referral_id: Uuid,
        request: ScheduleReferralRequest,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        let referral = self.get_referral(referral_id, auth_token).await?;

        ensure_transition(referral.status, ReferralStatus::Scheduled)?;

        let provider_id = referral
            .provider_id
            .ok_or_else(|| ReferralError::ValidationError("Referral has no provider".to_string()))?;

        let booking_request = BookAppointmentRequest {
            owner_id: referral.owner_id,
            pet_id: referral.pet_id,
            provider_id,
            referral_id: Some(referral.id),
            start_time: request.start_time,
            duration_minutes: request.duration_minutes,
            visit_type: VisitType::SpecialistConsult,
            visit_address: request.visit_address,
            visit_lat: request.visit_lat,
            visit_lng: request.visit_lng,
            owner_notes: request.owner_notes,
        };

        let appointment = self
            .booking
            .book_appointment(booking_request, auth_token)
            .await
            .map_err(|e| ReferralError::SchedulingFailed(e.to_string()))?;

        let update = json!({
            "status": "scheduled",
            "appointment_id": appointment.id,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let updated = self.patch(referral_id, update, auth_token).await?;
        info!(
            "Referral {} scheduled as appointment {}",
            referral_id, appointment.id
        );
        Ok(updated)
    }

    pub async fn start(
        &self,
        referral_id: Uuid,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        self.simple_transition(referral_id, ReferralStatus::InProgress, auth_token)
            .await
    }

    pub async fn complete(
        &self,
        referral_id: Uuid,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        self.simple_transition(referral_id, ReferralStatus::Completed, auth_token)
            .await
    }

    pub async fn cancel(
        &self,
        referral_id: Uuid,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        self.simple_transition(referral_id, ReferralStatus::Cancelled, auth_token)
            .await
    }

    async fn simple_transition(
        &self,
        referral_id: Uuid,
        next: ReferralStatus,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        let referral = self.get_referral(referral_id, auth_token).await?;
        ensure_transition(referral.status, next)?;

        let update = json!({
            "status": next,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.patch(referral_id, update, auth_token).await
    }

    /// Pending referrals past their expiry flip to unassigned on read.
    async fn expire_if_due(
        &self,
        referral: Referral,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        if referral.status == ReferralStatus::Pending {
            if let Some(expires_at) = referral.expires_at {
                if expires_at <= Utc::now() {
                    warn!("Referral {} expired without acceptance", referral.id);
                    let update = json!({
                        "status": "unassigned",
                        "updated_at": Utc::now().to_rfc3339(),
                    });
                    return self.patch(referral.id, update, auth_token).await;
                }
            }
        }
        Ok(referral)
    }

    async fn fetch(&self, referral_id: Uuid, auth_token: &str) -> Result<Referral, ReferralError> {
        let path = format!("/rest/v1/referrals?id=eq.{}", referral_id);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ReferralError::DatabaseError(e.to_string()))?;

        parse_single_referral(rows)
    }

    async fn insert_returning(
        &self,
        body: Value,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/referrals",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| ReferralError::DatabaseError(e.to_string()))?;

        parse_single_referral(rows)
    }

    async fn patch(
        &self,
        referral_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Referral, ReferralError> {
        let path = format!("/rest/v1/referrals?id=eq.{}", referral_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| ReferralError::DatabaseError(e.to_string()))?;

        parse_single_referral(rows)
    }
}

fn ensure_transition(from: ReferralStatus, to: ReferralStatus) -> Result<(), ReferralError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ReferralError::InvalidStatusTransition(from, to))
    }
}

fn parse_single_referral(rows: Vec<Value>) -> Result<Referral, ReferralError> {
    let row = rows.into_iter().next().ok_or(ReferralError::NotFound)?;
    serde_json::from_value(row)
        .map_err(|e| ReferralError::DatabaseError(format!("Failed to parse referral: {}", e)))
}

fn parse_referrals(rows: Vec<Value>) -> Result<Vec<Referral>, ReferralError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Referral>, _>>()
        .map_err(|e| ReferralError::DatabaseError(format!("Failed to parse referrals: {}", e)))
}
