use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::models::{DocumentType, ScoreBreakdown};

pub const AUTO_REVIEW_THRESHOLD: i32 = 70;

const POINTS_PER_DOC_TYPE: i32 = 25;
const MISSING_LICENSE_PENALTY: i32 = -10;
const STALE_DOC_PENALTY: i32 = -5;
const PROFILE_COMPLETE_BONUS: i32 = 10;
const STALE_AFTER_DAYS: i64 = 90;

/// Document fields the heuristic looks at.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub doc_type: DocumentType,
    pub issued_at: Option<DateTime<Utc>>,
}

/// The penalty is for a missing license number, not a suspicious one;
/// format checks belong to the human review.
pub fn license_number_present(license_number: Option<&str>) -> bool {
    license_number.map(|n| !n.trim().is_empty()).unwrap_or(false)
}

/// Submission-time confidence heuristic, 0..=100. High-scoring requests are
/// flagged for fast-track review; the decision itself stays with an admin.
pub fn compute_score(
    documents: &[ScoredDocument],
    license_number: Option<&str>,
    profile_complete: bool,
    submitted_at: DateTime<Utc>,
) -> ScoreBreakdown {
    let present_types: HashSet<DocumentType> =
        documents.iter().map(|d| d.doc_type).collect();
    let document_points = present_types.len() as i32 * POINTS_PER_DOC_TYPE;

    let missing_license_penalty = if license_number_present(license_number) {
        0
    } else {
        MISSING_LICENSE_PENALTY
    };

    let stale_cutoff = submitted_at - Duration::days(STALE_AFTER_DAYS);
    let stale_count = documents
        .iter()
        .filter(|d| d.issued_at.map(|t| t < stale_cutoff).unwrap_or(false))
        .count() as i32;
    let stale_document_penalty = stale_count * STALE_DOC_PENALTY;

    let profile_completeness_bonus = if profile_complete {
        PROFILE_COMPLETE_BONUS
    } else {
        0
    };

    let total = (document_points
        + missing_license_penalty
        + stale_document_penalty
        + profile_completeness_bonus)
        .clamp(0, 100);

    ScoreBreakdown {
        document_points,
        missing_license_penalty,
        stale_document_penalty,
        profile_completeness_bonus,
        total,
    }
}

pub fn auto_review_recommended(breakdown: &ScoreBreakdown) -> bool {
    breakdown.total >= AUTO_REVIEW_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(doc_type: DocumentType, issued_days_ago: Option<i64>) -> ScoredDocument {
        let submitted = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        ScoredDocument {
            doc_type,
            issued_at: issued_days_ago.map(|d| submitted - Duration::days(d)),
        }
    }

    fn submitted() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn full_submission_hits_the_ceiling() {
        let docs = vec![
            doc(DocumentType::GovernmentId, Some(10)),
            doc(DocumentType::VeterinaryLicense, Some(10)),
            doc(DocumentType::Insurance, Some(10)),
            doc(DocumentType::ProofOfAddress, Some(10)),
        ];

        let breakdown = compute_score(&docs, Some("VET-204871"), true, submitted());

        assert_eq!(breakdown.document_points, 100);
        assert_eq!(breakdown.total, 100); // clamped from 110
        assert!(auto_review_recommended(&breakdown));
    }

    #[test]
    fn duplicate_doc_types_count_once() {
        let docs = vec![
            doc(DocumentType::GovernmentId, None),
            doc(DocumentType::GovernmentId, None),
        ];

        let breakdown = compute_score(&docs, Some("VET-204871"), false, submitted());
        assert_eq!(breakdown.document_points, 25);
    }

    #[test]
    fn stale_documents_and_missing_license_drag_the_score() {
        let docs = vec![
            doc(DocumentType::GovernmentId, Some(120)),
            doc(DocumentType::Insurance, Some(200)),
        ];

        let breakdown = compute_score(&docs, None, false, submitted());

        assert_eq!(breakdown.document_points, 50);
        assert_eq!(breakdown.missing_license_penalty, -10);
        assert_eq!(breakdown.stale_document_penalty, -10);
        assert_eq!(breakdown.total, 30);
        assert!(!auto_review_recommended(&breakdown));
    }

    #[test]
    fn score_never_goes_negative() {
        let breakdown = compute_score(&[], None, false, submitted());
        assert_eq!(breakdown.total, 0);
    }

    #[test]
    fn only_a_missing_or_blank_license_is_penalized() {
        assert!(license_number_present(Some("VET-204871")));
        assert!(!license_number_present(Some("   ")));
        assert!(!license_number_present(None));

        // Any non-blank number escapes the penalty, whatever it looks like
        let breakdown = compute_score(&[], Some("12345"), false, submitted());
        assert_eq!(breakdown.missing_license_penalty, 0);
    }

    #[test]
    fn threshold_sits_at_70() {
        // 3 doc types + license + complete profile: 75 + 0 + 10 = 85
        let docs = vec![
            doc(DocumentType::GovernmentId, Some(5)),
            doc(DocumentType::VeterinaryLicense, Some(5)),
            doc(DocumentType::Insurance, Some(5)),
        ];
        let breakdown = compute_score(&docs, Some("VET-204871"), true, submitted());
        assert_eq!(breakdown.total, 85);
        assert!(auto_review_recommended(&breakdown));

        // 3 doc types, no license, bare profile: 75 - 10 = 65
        let breakdown = compute_score(&docs, None, false, submitted());
        assert_eq!(breakdown.total, 65);
        assert!(!auto_review_recommended(&breakdown));
    }
}
