use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    CreateAnnotationRequest, DocumentAnnotation, UpdateAnnotationRequest, VerificationError,
};

pub struct AnnotationService {
    supabase: SupabaseClient,
}

impl AnnotationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create(
        &self,
        document_id: Uuid,
        author_id: Uuid,
        request: CreateAnnotationRequest,
        auth_token: &str,
    ) -> Result<DocumentAnnotation, VerificationError> {
        validate_annotation(request.page, Some(&request.rect), Some(&request.note))?;

        // The document must exist before a note can hang off it
        let path = format!(
            "/rest/v1/verification_documents?id=eq.{}&select=id",
            document_id
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;
        if existing.is_empty() {
            return Err(VerificationError::DocumentNotFound);
        }

        let body = json!({
            "document_id": document_id,
            "page": request.page,
            "rect": request.rect,
            "note": request.note.trim(),
            "author_id": author_id,
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
                "/rest/v1/document_annotations",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        parse_single_annotation(rows)
    }

    pub async fn update(
        &self,
        annotation_id: Uuid,
        request: UpdateAnnotationRequest,
        auth_token: &str,
    ) -> Result<DocumentAnnotation, VerificationError> {
        validate_annotation(
            request.page.unwrap_or(1),
            request.rect.as_ref(),
            request.note.as_deref(),
        )?;

        let mut update = serde_json::Map::new();
        if let Some(page) = request.page {
            update.insert("page".to_string(), json!(page));
        }
        if let Some(rect) = request.rect {
            update.insert("rect".to_string(), json!(rect));
        }
        if let Some(note) = request.note {
            update.insert("note".to_string(), json!(note.trim()));
        }
        if update.is_empty() {
            return Err(VerificationError::ValidationError(
                "Nothing to update".to_string(),
            ));
        }

        let path = format!("/rest/v1/document_annotations?id=eq.{}", annotation_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update)),
                Some(headers),
            )
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        parse_single_annotation(rows)
    }

    pub async fn delete(
        &self,
        annotation_id: Uuid,
        auth_token: &str,
    ) -> Result<(), VerificationError> {
        let path = format!("/rest/v1/document_annotations?id=eq.{}", annotation_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await
            .map_err(|e| VerificationError::DatabaseError(e.to_string()))?;

        if deleted.is_empty() {
            return Err(VerificationError::AnnotationNotFound);
        }
        Ok(())
    }

    pub async fn list_for_document(
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
}

fn parse_single_annotation(rows: Vec<Value>) -> Result<DocumentAnnotation, VerificationError> {
    let row = rows
        .into_iter()
        .next()
        .ok_or(VerificationError::AnnotationNotFound)?;
    serde_json::from_value(row).map_err(|e| {
        VerificationError::DatabaseError(format!("Failed to parse annotation: {}", e))
    })
}

fn validate_annotation(
    page: i32,
    rect: Option<&crate::models::AnnotationRect>,
    note: Option<&str>,
) -> Result<(), VerificationError> {
    if page < 1 {
        return Err(VerificationError::ValidationError(
            "Page numbers start at 1".to_string(),
        ));
    }
    if let Some(rect) = rect {
        if !rect.is_normalized() {
            return Err(VerificationError::ValidationError(
                "Annotation rect must be normalized to 0..=1".to_string(),
            ));
        }
    }
    if let Some(note) = note {
        if note.trim().is_empty() {
            return Err(VerificationError::ValidationError(
                "Annotation note cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnnotationRect;
    use chrono::Utc;

    #[test]
    fn single_annotation_rows_parse_and_empty_means_not_found() {
        assert!(matches!(
            parse_single_annotation(vec![]),
            Err(VerificationError::AnnotationNotFound)
        ));

        let row = serde_json::to_value(DocumentAnnotation {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            page: 2,
            rect: AnnotationRect { x: 0.1, y: 0.2, w: 0.3, h: 0.1 },
            note: "expiry date unreadable".to_string(),
            author_id: Uuid::new_v4(),
            created_at: Utc::now(),
        })
        .unwrap();

        let parsed = parse_single_annotation(vec![row]).unwrap();
        assert_eq!(parsed.page, 2);
    }

    #[test]
    fn validation_catches_bad_input() {
        let rect = AnnotationRect { x: 0.1, y: 0.1, w: 0.2, h: 0.2 };

        assert!(validate_annotation(1, Some(&rect), Some("blurry date")).is_ok());
        assert!(validate_annotation(0, Some(&rect), Some("note")).is_err());
        assert!(validate_annotation(1, Some(&rect), Some("   ")).is_err());

        let wide = AnnotationRect { x: 0.5, y: 0.1, w: 0.6, h: 0.2 };
        assert!(validate_annotation(1, Some(&wide), Some("note")).is_err());
    }
}
