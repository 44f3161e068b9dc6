use chrono::Utc;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use notification_cell::services::notify::NotificationService;
use provider_cell::services::profile::ProviderProfileService;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    DocumentAnnotation, ReviewDecisionRequest, ScoreBreakdown, VerificationDocument,
    VerificationError, VerificationQueueQuery, VerificationRequest, VerificationStatus,
};
use crate::services::scoring::{self, ScoredDocument};
use crate::services::sla::{self, SlaSnapshot};
use crate::services::submission::{parse_requests, parse_single_request};

/// A queue row with its derived SLA label attached.
#[derive(Debug, Serialize)]
pub struct QueueEntry {
    #[serde(flatten)]
    pub request: VerificationRequest,
    pub sla: SlaSnapshot,
}

#[derive(Debug, Serialize)]
pub struct VerificationDetail {
    #[serde(flatten)]
    pub request: VerificationRequest,
    pub sla: SlaSnapshot,
    pub score_breakdown: ScoreBreakdown,
    pub documents: Vec<DocumentWithAnnotations>,
}

#[derive(Debug, Serialize)]
pub struct DocumentWithAnnotations {
    #[serde(flatten)]
    pub document: VerificationDocument,
    pub annotations: Vec<DocumentAnnotation>,
}

pub struct VerificationReviewService {
    supabase: SupabaseClient,
    profiles: ProviderProfileService,
    notifications: NotificationService,
}

impl VerificationReviewService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            profiles: ProviderProfileService::new(config),
            notifications: NotificationService::new(config),
        }
    }

    /// The admin review queue. Status and priority filter at the database;
    /// the SLA label is derived here so it filters after the fetch.
    pub async fn queue(
        &self,
        query: &VerificationQueueQuery,
        auth_token: &str,
    ) -> Result<Vec<QueueEntry>, VerificationError> {
        let mut parts = Vec::new();
        if let Some(status) = query.status {
            parts.push(format!("status=eq.{}", status));
        }
        if let Some(priority) = query.priority {
            parts.push(format!("priority=eq.{}", priority));
        }

        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let offset = query.offset.unwrap_or(0).max(0);
        parts.push(format!("limit={}", limit));
        parts.push(format!("offset={}", offset));
        parts.push("order=submitted_at.asc".to_string());

        let path = format!("/rest/v1/verification_requests?{}", parts.join("&"));

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        let now = Utc::now();
        let entries: Vec<QueueEntry> = parse_requests(rows)?
            .into_iter()
            .map(|request| {
                let sla = sla::sla_snapshot(&request, now);
                QueueEntry { request, sla }
            })
            .filter(|e| query.sla.map(|want| e.sla.status == want).unwrap_or(true))
            .collect();

        Ok(entries)
    }

    pub async fn detail(
        &self,
        request_id: Uuid,
        auth_token: &str,
    ) -> Result<VerificationDetail, VerificationError> {
        let request = self.get_request(request_id, auth_token).await?;
        let documents = self.documents_for_request(request_id, auth_token).await?;

        let profile = self
            .profiles
            .get_profile(request.provider_id, auth_token)
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        let scored: Vec<ScoredDocument> = documents
            .iter()
            .map(|d| ScoredDocument {
                doc_type: d.doc_type,
                issued_at: d.issued_at,
            })
            .collect();
        let score_breakdown = scoring::compute_score(
            &scored,
            profile.license_number.as_deref(),
            profile.is_profile_complete(),
            request.submitted_at,
        );

        let mut with_annotations = Vec::with_capacity(documents.len());
        for document in documents {
            let annotations = self.annotations_for_document(document.id, auth_token).await?;
            with_annotations.push(DocumentWithAnnotations {
                document,
                annotations,
            });
        }

        let sla = sla::sla_snapshot(&request, Utc::now());

        Ok(VerificationDetail {
            request,
            sla,
            score_breakdown,
            documents: with_annotations,
        })
    }

    pub async fn approve(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        decision: ReviewDecisionRequest,
        auth_token: &str,
    ) -> Result<VerificationRequest, VerificationError> {
        self.decide(request_id, reviewer_id, decision, true, auth_token)
            .await
    }

    pub async fn reject(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        decision: ReviewDecisionRequest,
        auth_token: &str,
    ) -> Result<VerificationRequest, VerificationError> {
        self.decide(request_id, reviewer_id, decision, false, auth_token)
            .await
    }

    async fn decide(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        decision: ReviewDecisionRequest,
        approved: bool,
        auth_token: &str,
    ) -> Result<VerificationRequest, VerificationError> {
        let request = self.get_request(request_id, auth_token).await?;

        if request.status.is_decided() {
            return Err(VerificationError::AlreadyDecided(request.status));
        }

        let status = if approved {
            VerificationStatus::Approved
        } else {
            VerificationStatus::Rejected
        };

        let update = json!({
            "status": status,
            "review_notes": decision.notes,
            "reviewed_at": Utc::now().to_rfc3339(),
            "reviewed_by": reviewer_id,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let updated = self.patch_request(request_id, update, auth_token).await?;

        // The decision is what flips the provider's verified flag
        let flag = json!({
            "is_verified": approved,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let path = format!("/rest/v1/provider_profiles?id=eq.{}", updated.provider_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(flag))
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        if let Ok(profile) = self
            .profiles
            .get_profile(updated.provider_id, auth_token)
            .await
        {
            self.notifications
                .verification_decided(profile.user_id, updated.id, approved, auth_token)
                .await;
        }

        info!(
            "Verification request {} {} by {}",
            request_id, status, reviewer_id
        );

        Ok(updated)
    }

    pub async fn get_request(
        &self,
        request_id: Uuid,
        auth_token: &str,
    ) -> Result<VerificationRequest, VerificationError> {
        let path = format!("/rest/v1/verification_requests?id=eq.{}", request_id);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        parse_single_request(rows)
    }

    pub async fn documents_for_request(
        &self,
        request_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<VerificationDocument>, VerificationError> {
        let path = format!(
            "/rest/v1/verification_documents?request_id=eq.{}&order=uploaded_at.asc",
            request_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<VerificationDocument>, _>>()
            .map_err(|e| {
                VerificationError::DatabaseError(format!("Failed to parse documents: {}", e))
            })
    }

    async fn annotations_for_document(
        &self,
        document_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<DocumentAnnotation>, VerificationError> {
        let path = format!(
            "/rest/v1/document_annotations?document_id=eq.{}&order=created_at.asc",
            document_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DocumentAnnotation>, _>>()
            .map_err(|e| {
                VerificationError::DatabaseError(format!("Failed to parse annotations: {}", e))
            })
    }

    async fn patch_request(
        &self,
        request_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<VerificationRequest, VerificationError> {
        let path = format!("/rest/v1/verification_requests?id=eq.{}", request_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        parse_single_request(rows)
    }
}
