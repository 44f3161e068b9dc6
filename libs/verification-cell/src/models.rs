use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// VERIFICATION REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: Uuid,
    pub provider_id: Uuid,
    /// The user who submitted (usually the provider's own account).
    pub submitted_by: Uuid,
    pub priority: VerificationPriority,
    pub status: VerificationStatus,
    pub score: i32,
    pub auto_review_recommended: bool,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::Pending => write!(f, "pending"),
            VerificationStatus::Approved => write!(f, "approved"),
            VerificationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl VerificationStatus {
    pub fn is_decided(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPriority {
    Urgent,
    High,
    Standard,
    Low,
}

impl fmt::Display for VerificationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationPriority::Urgent => write!(f, "urgent"),
            VerificationPriority::High => write!(f, "high"),
            VerificationPriority::Standard => write!(f, "standard"),
            VerificationPriority::Low => write!(f, "low"),
        }
    }
}

impl VerificationPriority {
    /// Review-turnaround goal in hours.
    pub fn goal_hours(&self) -> i64 {
        match self {
            VerificationPriority::Urgent => 24,
            VerificationPriority::High => 48,
            VerificationPriority::Standard => 72,
            VerificationPriority::Low => 120,
        }
    }
}

/// Derived per read from the submission clock; never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SlaStatus {
    #[serde(rename = "On Track")]
    OnTrack,
    #[serde(rename = "At Risk")]
    AtRisk,
    Breached,
    Completed,
}

impl fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlaStatus::OnTrack => write!(f, "On Track"),
            SlaStatus::AtRisk => write!(f, "At Risk"),
            SlaStatus::Breached => write!(f, "Breached"),
            SlaStatus::Completed => write!(f, "Completed"),
        }
    }
}

// ==============================================================================
// DOCUMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    GovernmentId,
    VeterinaryLicense,
    Insurance,
    ProofOfAddress,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::GovernmentId,
        DocumentType::VeterinaryLicense,
        DocumentType::Insurance,
        DocumentType::ProofOfAddress,
    ];
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::GovernmentId => write!(f, "government_id"),
            DocumentType::VeterinaryLicense => write!(f, "veterinary_license"),
            DocumentType::Insurance => write!(f, "insurance"),
            DocumentType::ProofOfAddress => write!(f, "proof_of_address"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationDocument {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider_id: Uuid,
    pub doc_type: DocumentType,
    pub file_url: String,
    pub content_type: String,
    /// Issue date printed on the document, when the submitter provides it.
    pub issued_at: Option<DateTime<Utc>>,
    pub uploaded_at: DateTime<Utc>,
}

// ==============================================================================
// ANNOTATION MODELS
// ==============================================================================

/// A reviewer note pinned to a region of a document page. Coordinates are
/// normalized to the page so the viewer can render at any zoom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnnotation {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page: i32,
    pub rect: AnnotationRect,
    pub note: String,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AnnotationRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl AnnotationRect {
    /// Both corners must stay inside the unit square.
    pub fn is_normalized(&self) -> bool {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        in_unit(self.x)
            && in_unit(self.y)
            && self.w > 0.0
            && self.h > 0.0
            && in_unit(self.x + self.w)
            && in_unit(self.y + self.h)
    }
}

// ==============================================================================
// SCORING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub document_points: i32,
    pub missing_license_penalty: i32,
    pub stale_document_penalty: i32,
    pub profile_completeness_bonus: i32,
    pub total: i32,
}

// ==============================================================================
// REQUEST / QUERY MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentUpload {
    pub doc_type: DocumentType,
    /// File extension without the dot, e.g. "pdf" or "jpg".
    pub extension: String,
    pub content_type: String,
    /// Raw file content, base64-encoded.
    pub data: String,
    pub issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitVerificationRequest {
    pub provider_id: Uuid,
    pub priority: Option<VerificationPriority>,
    pub documents: Vec<DocumentUpload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDecisionRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationQueueQuery {
    pub status: Option<VerificationStatus>,
    pub priority: Option<VerificationPriority>,
    /// Filter on the derived SLA label, applied after derivation.
    pub sla: Option<SlaStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnnotationRequest {
    pub page: i32,
    pub rect: AnnotationRect,
    pub note: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAnnotationRequest {
    pub page: Option<i32>,
    pub rect: Option<AnnotationRect>,
    pub note: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Verification request not found")]
    NotFound,

    #[error("Document not found")]
    DocumentNotFound,

    #[error("Annotation not found")]
    AnnotationNotFound,

    #[error("Request already decided as {0}")]
    AlreadyDecided(VerificationStatus),

    #[error("Unauthorized access to verification data")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
