use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use notification_cell::services::notify::NotificationService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AdminError, ModerationAction, ModerationRecord};

pub struct ModerationService {
    supabase: SupabaseClient,
    notifications: NotificationService,
}

impl ModerationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            notifications: NotificationService::new(config),
        }
    }

    pub async fn suspend(
        &self,
        user_id: Uuid,
        actor_id: Uuid,
        reason: &str,
        auth_token: &str,
    ) -> Result<ModerationRecord, AdminError> {
        self.moderate(user_id, actor_id, reason, ModerationAction::Suspend, auth_token)
            .await
    }

    pub async fn reinstate(
        &self,
        user_id: Uuid,
        actor_id: Uuid,
        reason: &str,
        auth_token: &str,
    ) -> Result<ModerationRecord, AdminError> {
        self.moderate(user_id, actor_id, reason, ModerationAction::Reinstate, auth_token)
            .await
    }

    async fn moderate(
        &self,
        user_id: Uuid,
        actor_id: Uuid,
        reason: &str,
        action: ModerationAction,
        auth_token: &str,
    ) -> Result<ModerationRecord, AdminError> {
        if reason.trim().is_empty() {
            return Err(AdminError::ValidationError(
                "A moderation reason is required".to_string(),
            ));
        }

        let account = self
            .supabase
            .get_account(&user_id.to_string(), auth_token)
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))?;

        if account.get("exists").and_then(|v| v.as_bool()) == Some(false) {
            return Err(AdminError::AccountNotFound);
        }

        let currently_suspended = account
            .get("is_suspended")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let suspending = action == ModerationAction::Suspend;
        if suspending == currently_suspended {
            let state = if currently_suspended { "suspended" } else { "active" };
            return Err(AdminError::AlreadyInState(state.to_string()));
        }

        let account_update = json!({
            "is_suspended": suspending,
            "suspension_reason": if suspending { Some(reason.trim()) } else { None },
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/accounts?user_id=eq.{}", user_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(account_update))
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))?;

        // Audit entry records who did it and why
        let audit = json!({
            "user_id": user_id,
            "action": action,
            "reason": reason.trim(),
            "actor_id": actor_id,
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
                "/rest/v1/moderation_actions",
                Some(auth_token),
                Some(audit),
                Some(headers),
            )
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))?;

        let record: ModerationRecord = rows
            .into_iter()
            .next()
            .ok_or(AdminError::AccountNotFound)
            .and_then(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AdminError::DatabaseError(format!("Failed to parse moderation record: {}", e))
                })
            })?;

        info!(
            "Moderation {} applied to user {} by {}: {}",
            action,
            user_id,
            actor_id,
            reason.trim()
        );

        self.notifications
            .account_moderated(user_id, suspending, reason.trim(), auth_token)
            .await;

        Ok(record)
    }

    pub async fn history(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ModerationRecord>, AdminError> {
        let path = format!(
            "/rest/v1/moderation_actions?user_id=eq.{}&order=created_at.desc",
            user_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdminError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ModerationRecord>, _>>()
            .map_err(|e| {
                AdminError::DatabaseError(format!("Failed to parse moderation history: {}", e))
            })
    }
}
