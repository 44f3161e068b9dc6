use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use provider_cell::services::profile::ProviderProfileService;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    DocumentUpload, SubmitVerificationRequest, VerificationDocument, VerificationError,
    VerificationPriority, VerificationRequest,
};
use crate::services::scoring::{self, ScoredDocument};

const STORAGE_BUCKET: &str = "verification-documents";
const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

pub struct VerificationSubmissionService {
    supabase: SupabaseClient,
    profiles: ProviderProfileService,
}

fn extension_format() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]{1,8}$").ok()).as_ref()
}

fn extension_valid(extension: &str) -> bool {
    extension_format()
        .map(|re| re.is_match(extension))
        .unwrap_or(false)
}

impl VerificationSubmissionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            profiles: ProviderProfileService::new(config),
        }
    }

    /// Upload the documents, score the submission and create the request row.
    pub async fn submit(
        &self,
        submitted_by: Uuid,
        request: SubmitVerificationRequest,
        auth_token: &str,
    ) -> Result<VerificationRequest, VerificationError> {
        if request.documents.is_empty() {
            return Err(VerificationError::ValidationError(
                "At least one document is required".to_string(),
            ));
        }
        for doc in &request.documents {
            validate_upload(doc)?;
        }

        let profile = self
            .profiles
            .get_profile(request.provider_id, auth_token)
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        let submitted_at = Utc::now();

        let scored: Vec<ScoredDocument> = request
            .documents
            .iter()
            .map(|d| ScoredDocument {
                doc_type: d.doc_type,
                issued_at: d.issued_at,
            })
            .collect();

        let breakdown = scoring::compute_score(
            &scored,
            profile.license_number.as_deref(),
            profile.is_profile_complete(),
            submitted_at,
        );

        let priority = request.priority.unwrap_or(VerificationPriority::Standard);

        let body = json!({
            "provider_id": request.provider_id,
            "submitted_by": submitted_by,
            "priority": priority,
            "status": "pending",
            "score": breakdown.total,
            "auto_review_recommended": scoring::auto_review_recommended(&breakdown),
            "submitted_at": submitted_at.to_rfc3339(),
        });

        let created = self.insert_request(body, auth_token).await?;

        // Uploads happen after the row exists so documents can reference it
        for doc in &request.documents {
            if let Err(e) = self
                .upload_document(created.id, request.provider_id, doc, auth_token)
                .await
            {
                warn!("Document upload failed for request {}: {}", created.id, e);
                self.discard_request(created.id, auth_token).await;
                return Err(e);
            }
        }

        info!(
            "Verification request {} submitted for provider {} (score {})",
            created.id, request.provider_id, breakdown.total
        );

        Ok(created)
    }

    async fn upload_document(
        &self,
        request_id: Uuid,
        provider_id: Uuid,
        doc: &DocumentUpload,
        auth_token: &str,
    ) -> Result<VerificationDocument, VerificationError> {
        let bytes = BASE64
            .decode(doc.data.as_bytes())
            .map_err(|e| VerificationError::ValidationError(format!("Invalid base64 data: {}", e)))?;

        if bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(VerificationError::ValidationError(
                "Document exceeds the 10 MB limit".to_string(),
            ));
        }

        let object_path = format!("{}/{}.{}", provider_id, Uuid::new_v4(), doc.extension);

        let file_url = self
            .supabase
            .upload_file(STORAGE_BUCKET, &object_path, bytes, &doc.content_type, auth_token)
            .await
            .map_err(|e| VerificationError::UploadFailed(e.to_string()))?;

        let body = json!({
            "request_id": request_id,
            "provider_id": provider_id,
            "doc_type": doc.doc_type,
            "file_url": file_url,
            "content_type": doc.content_type,
            "issued_at": doc.issued_at.map(|t| t.to_rfc3339()),
            "uploaded_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/verification_documents",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or(VerificationError::DocumentNotFound)
            .and_then(|row| {
                serde_json::from_value(row).map_err(|e| {
                    VerificationError::DatabaseError(format!("Failed to parse document: {}", e))
                })
            })
    }

    /// Requests submitted for a given provider, newest first.
    pub async fn requests_for_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<VerificationRequest>, VerificationError> {
        let path = format!(
            "/rest/v1/verification_requests?provider_id=eq.{}&order=submitted_at.desc",
            provider_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        parse_requests(rows)
    }

    /// A failed submission must not leave a scored pending row in the admin
    /// queue, so the request and any documents that did land are removed.
    /// Best-effort: the caller still sees the upload error.
    async fn discard_request(&self, request_id: Uuid, auth_token: &str) {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let docs_path = format!(
            "/rest/v1/verification_documents?request_id=eq.{}",
            request_id
        );
        if let Err(e) = self
            .supabase
            .request_with_headers::<Vec<Value>>(
                Method::DELETE,
                &docs_path,
                Some(auth_token),
                None,
                Some(headers.clone()),
            )
            .await
        {
            warn!(
                "Failed to remove documents for discarded request {}: {}",
                request_id, e
            );
        }

        let request_path = format!("/rest/v1/verification_requests?id=eq.{}", request_id);
        if let Err(e) = self
            .supabase
            .request_with_headers::<Vec<Value>>(
                Method::DELETE,
                &request_path,
                Some(auth_token),
                None,
                Some(headers),
            )
            .await
        {
            warn!("Failed to remove discarded request {}: {}", request_id, e);
        }
    }

    async fn insert_request(
        &self,
        body: Value,
        auth_token: &str,
    ) -> Result<VerificationRequest, VerificationError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/verification_requests",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        parse_single_request(rows)
    }
}

fn validate_upload(doc: &DocumentUpload) -> Result<(), VerificationError> {
    if !extension_valid(&doc.extension) {
        return Err(VerificationError::ValidationError(format!(
            "Invalid file extension: {}",
            doc.extension
        )));
    }
    if doc.content_type.trim().is_empty() {
        return Err(VerificationError::ValidationError(
            "Content type is required".to_string(),
        ));
    }
    if doc.data.is_empty() {
        return Err(VerificationError::ValidationError(
            "Document data is empty".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn parse_single_request(
    rows: Vec<Value>,
) -> Result<VerificationRequest, VerificationError> {
    let row = rows.into_iter().next().ok_or(VerificationError::NotFound)?;
    serde_json::from_value(row).map_err(|e| {
        VerificationError::DatabaseError(format!("Failed to parse verification request: {}", e))
    })
}

pub(crate) fn parse_requests(
    rows: Vec<Value>,
) -> Result<Vec<VerificationRequest>, VerificationError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<VerificationRequest>, _>>()
        .map_err(|e| {
            VerificationError::DatabaseError(format!("Failed to parse verification requests: {}", e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_validation() {
        assert!(extension_valid("pdf"));
        assert!(extension_valid("jpg"));
        assert!(extension_valid("png"));
        assert!(!extension_valid("PDF"));
        assert!(!extension_valid("tar.gz"));
        assert!(!extension_valid(""));
        assert!(!extension_valid("../etc"));
    }
}
