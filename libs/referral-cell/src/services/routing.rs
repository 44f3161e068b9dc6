use std::collections::HashMap;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use provider_cell::models::{ProviderProfile, ProviderSearchQuery};
use provider_cell::services::profile::ProviderProfileService;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{ReferralCandidate, ReferralError};

pub struct ReferralRoutingService {
    supabase: SupabaseClient,
    profiles: ProviderProfileService,
}

impl ReferralRoutingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            profiles: ProviderProfileService::new(config),
        }
    }

    /// Build the ranked candidate list for a new referral: verified, active
    /// providers carrying the specialty, ordered by prior completed visits
    /// with this owner, then experience.
    pub async fn rank_candidates_for(
        &self,
        specialty: &str,
        owner_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ReferralCandidate>, ReferralError> {
        let query = ProviderSearchQuery {
            specialty: Some(specialty.to_string()),
            lat: None,
            lng: None,
            limit: Some(50),
        };

        let profiles = self
            .profiles
            .search_providers(query, auth_token)
            .await
            .map_err(|e| ReferralError::DatabaseError(e.to_string()))?;

        if profiles.is_empty() {
            return Err(ReferralError::NoCandidates(specialty.to_string()));
        }

        let history = self
            .completed_counts_with_owner(owner_id, &profiles, auth_token)
            .await?;

        debug!(
            "Ranked {} candidates for specialty {}",
            profiles.len(),
            specialty
        );

        Ok(rank_candidates(&profiles, &history))
    }

    /// Completed-appointment counts between the owner and each candidate.
    async fn completed_counts_with_owner(
        &self,
        owner_id: Uuid,
        profiles: &[ProviderProfile],
        auth_token: &str,
    ) -> Result<HashMap<Uuid, i64>, ReferralError> {
        let provider_ids: Vec<String> = profiles.iter().map(|p| p.id.to_string()).collect();

        let path = format!(
            "/rest/v1/appointments?owner_id=eq.{}&status=eq.completed&provider_id=in.({})&select=provider_id",
            owner_id,
            provider_ids.join(",")
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ReferralError::DatabaseError(e.to_string()))?;

        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for row in rows {
            if let Some(id) = row
                .get("provider_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Uuid>().ok())
            {
                *counts.entry(id).or_insert(0) += 1;
            }
        }

        Ok(counts)
    }
}

/// Order candidates by prior completed appointments with the owner (desc),
/// then years of experience (desc), then provider id for a stable tail.
pub fn rank_candidates(
    profiles: &[ProviderProfile],
    completed_with_owner: &HashMap<Uuid, i64>,
) -> Vec<ReferralCandidate> {
    let mut candidates: Vec<ReferralCandidate> = profiles
        .iter()
        .map(|p| ReferralCandidate {
            provider_id: p.id,
            rank: 0,
            prior_completed_with_owner: completed_with_owner.get(&p.id).copied().unwrap_or(0),
            years_of_experience: p.years_of_experience,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.prior_completed_with_owner
            .cmp(&a.prior_completed_with_owner)
            .then(b.years_of_experience.cmp(&a.years_of_experience))
            .then(a.provider_id.cmp(&b.provider_id))
    });

    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = i as i32 + 1;
    }

    candidates
}
