use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    CreateProviderProfileRequest, ProviderError, ProviderProfile, ProviderSearchQuery,
    UpdateProviderProfileRequest,
};

pub struct ProviderProfileService {
    supabase: SupabaseClient,
}

impl ProviderProfileService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_profile(
        &self,
        request: CreateProviderProfileRequest,
        auth_token: &str,
    ) -> Result<ProviderProfile, ProviderError> {
        debug!("Creating provider profile for user {}", request.user_id);

        if request.display_name.trim().is_empty() {
            return Err(ProviderError::ValidationError(
                "Display name cannot be empty".to_string(),
            ));
        }

        if let Some(radius) = request.service_radius_km {
            if radius <= 0.0 {
                return Err(ProviderError::ValidationError(
                    "Service radius must be positive".to_string(),
                ));
            }
        }

        let now = Utc::now().to_rfc3339();
        let profile_data = json!({
            "user_id": request.user_id,
            "display_name": request.display_name,
            "specialties": request.specialties,
            "bio": request.bio,
            "license_number": request.license_number,
            "years_of_experience": request.years_of_experience.unwrap_or(0),
            "home_base_lat": request.home_base_lat,
            "home_base_lng": request.home_base_lng,
            "service_radius_km": request.service_radius_km,
            "is_active": true,
            "is_verified": false,
            "created_at": now,
            "updated_at": now
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
                "/rest/v1/provider_profiles",
                Some(auth_token),
                Some(profile_data),
                Some(headers),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        parse_single_profile(result)
    }

    pub async fn get_profile(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<ProviderProfile, ProviderError> {
        let path = format!("/rest/v1/provider_profiles?id=eq.{}", provider_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        parse_single_profile(result)
    }

    pub async fn get_profile_by_user(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<ProviderProfile, ProviderError> {
        let path = format!("/rest/v1/provider_profiles?user_id=eq.{}", user_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        parse_single_profile(result)
    }

    pub async fn update_profile(
        &self,
        provider_id: Uuid,
        request: UpdateProviderProfileRequest,
        auth_token: &str,
    ) -> Result<ProviderProfile, ProviderError> {
        debug!("Updating provider profile {}", provider_id);

        let mut update_data = serde_json::Map::new();

        if let Some(name) = request.display_name {
            if name.trim().is_empty() {
                return Err(ProviderError::ValidationError(
                    "Display name cannot be empty".to_string(),
                ));
            }
            update_data.insert("display_name".to_string(), json!(name));
        }
        if let Some(specialties) = request.specialties {
            update_data.insert("specialties".to_string(), json!(specialties));
        }
        if let Some(bio) = request.bio {
            update_data.insert("bio".to_string(), json!(bio));
        }
        if let Some(license) = request.license_number {
            update_data.insert("license_number".to_string(), json!(license));
        }
        if let Some(years) = request.years_of_experience {
            if years < 0 {
                return Err(ProviderError::ValidationError(
                    "Years of experience cannot be negative".to_string(),
                ));
            }
            update_data.insert("years_of_experience".to_string(), json!(years));
        }
        if let Some(lat) = request.home_base_lat {
            update_data.insert("home_base_lat".to_string(), json!(lat));
        }
        if let Some(lng) = request.home_base_lng {
            update_data.insert("home_base_lng".to_string(), json!(lng));
        }
        if let Some(radius) = request.service_radius_km {
            if radius <= 0.0 {
                return Err(ProviderError::ValidationError(
                    "Service radius must be positive".to_string(),
                ));
            }
            update_data.insert("service_radius_km".to_string(), json!(radius));
        }
        if let Some(active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(active));
        }

        if update_data.is_empty() {
            return Err(ProviderError::ValidationError("No fields to update".to_string()));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/provider_profiles?id=eq.{}", provider_id);

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
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        parse_single_profile(result)
    }

    /// Search verified, active providers; optional specialty and distance filters.
    pub async fn search_providers(
        &self,
        query: ProviderSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<ProviderProfile>, ProviderError> {
        let mut query_parts = vec![
            "is_active=eq.true".to_string(),
            "is_verified=eq.true".to_string(),
        ];

        if let Some(specialty) = &query.specialty {
            // PostgREST array-contains filter
            query_parts.push(format!(
                "specialties=cs.{}",
                urlencoding::encode(&format!("{{{}}}", specialty))
            ));
        }

        let limit = query.limit.unwrap_or(50).clamp(1, 200);
        let path = format!(
            "/rest/v1/provider_profiles?{}&order=years_of_experience.desc&limit={}",
            query_parts.join("&"),
            limit
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let mut profiles: Vec<ProviderProfile> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse profiles: {}", e)))?;

        // Distance filtering happens here: PostgREST has no haversine
        if let (Some(lat), Some(lng)) = (query.lat, query.lng) {
            profiles.retain(|p| provider_covers_point(p, lat, lng));
        }

        Ok(profiles)
    }
}

/// True when the point lies inside the provider's service radius.
pub fn provider_covers_point(profile: &ProviderProfile, lat: f64, lng: f64) -> bool {
    match (
        profile.home_base_lat,
        profile.home_base_lng,
        profile.service_radius_km,
    ) {
        (Some(base_lat), Some(base_lng), Some(radius_km)) => {
            haversine_km(base_lat, base_lng, lat, lng) <= radius_km
        }
        // Providers without a declared service area are not filtered out
        _ => true,
    }
}

pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

fn parse_single_profile(result: Vec<Value>) -> Result<ProviderProfile, ProviderError> {
    let row = result.into_iter().next().ok_or(ProviderError::NotFound)?;
    serde_json::from_value(row)
        .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse profile: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn profile_at(lat: f64, lng: f64, radius_km: f64) -> ProviderProfile {
        ProviderProfile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            display_name: "Dr. Test".to_string(),
            specialties: vec!["general".to_string()],
            bio: None,
            license_number: None,
            years_of_experience: 5,
            home_base_lat: Some(lat),
            home_base_lng: Some(lng),
            service_radius_km: Some(radius_km),
            is_active: true,
            is_verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn haversine_known_distance() {
        // London to Paris, roughly 344 km
        let d = haversine_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 344.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn point_inside_radius_is_covered() {
        let profile = profile_at(40.7128, -74.0060, 30.0);
        // Newark is ~15 km from lower Manhattan
        assert!(provider_covers_point(&profile, 40.7357, -74.1724));
    }

    #[test]
    fn point_outside_radius_is_not_covered() {
        let profile = profile_at(40.7128, -74.0060, 30.0);
        // Philadelphia is ~130 km away
        assert!(!provider_covers_point(&profile, 39.9526, -75.1652));
    }

    #[test]
    fn provider_without_service_area_is_not_filtered() {
        let mut profile = profile_at(0.0, 0.0, 1.0);
        profile.home_base_lat = None;
        profile.home_base_lng = None;
        profile.service_radius_km = None;
        assert!(provider_covers_point(&profile, 89.0, 179.0));
    }
}
