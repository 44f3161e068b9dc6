use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Marketplace roles carried in the `role` claim.
pub mod roles {
    pub const PET_OWNER: &str = "pet_owner";
    pub const PROVIDER: &str = "provider";
    pub const CLINIC: &str = "clinic";
    pub const ADMIN: &str = "admin";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(roles::ADMIN)
    }

    pub fn is_provider(&self) -> bool {
        self.role.as_deref() == Some(roles::PROVIDER)
    }

    pub fn is_clinic(&self) -> bool {
        self.role.as_deref() == Some(roles::CLINIC)
    }

    pub fn is_pet_owner(&self) -> bool {
        self.role.as_deref() == Some(roles::PET_OWNER)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}
