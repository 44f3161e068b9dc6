use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AddVaccinationRequest, CreatePetRequest, Pet, PetError, UpdatePetRequest, VaccinationRecord,
};

pub struct PetService {
    supabase: SupabaseClient,
}

impl PetService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_pet(
        &self,
        request: CreatePetRequest,
        auth_token: &str,
    ) -> Result<Pet, PetError> {
        debug!("Creating pet '{}' for owner {}", request.name, request.owner_id);

        if request.name.trim().is_empty() {
            return Err(PetError::ValidationError("Pet name cannot be empty".to_string()));
        }

        if let Some(weight) = request.weight_kg {
            if weight <= 0.0 {
                return Err(PetError::ValidationError(
                    "Weight must be positive".to_string(),
                ));
            }
        }

        let now = Utc::now().to_rfc3339();
        let pet_data = json!({
            "owner_id": request.owner_id,
            "name": request.name,
            "species": request.species,
            "breed": request.breed,
            "date_of_birth": request.date_of_birth,
            "weight_kg": request.weight_kg,
            "sex": request.sex,
            "microchip_id": request.microchip_id,
            "medical_notes": request.medical_notes,
            "vaccinations": [],
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self
            .insert_returning("/rest/v1/pets", pet_data, auth_token)
            .await?;

        parse_single_pet(result)
    }

    pub async fn get_pet(&self, pet_id: Uuid, auth_token: &str) -> Result<Pet, PetError> {
        let path = format!("/rest/v1/pets?id=eq.{}", pet_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PetError::DatabaseError(e.to_string()))?;

        parse_single_pet(result)
    }

    pub async fn list_owner_pets(
        &self,
        owner_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Pet>, PetError> {
        let path = format!("/rest/v1/pets?owner_id=eq.{}&order=created_at.asc", owner_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PetError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<Pet>, _>>()
            .map_err(|e| PetError::DatabaseError(format!("Failed to parse pets: {}", e)))
    }

    pub async fn update_pet(
        &self,
        pet_id: Uuid,
        request: UpdatePetRequest,
        auth_token: &str,
    ) -> Result<Pet, PetError> {
        debug!("Updating pet {}", pet_id);

        let mut update_data = serde_json::Map::new();

        if let Some(name) = request.name {
            if name.trim().is_empty() {
                return Err(PetError::ValidationError("Pet name cannot be empty".to_string()));
            }
            update_data.insert("name".to_string(), json!(name));
        }
        if let Some(breed) = request.breed {
            update_data.insert("breed".to_string(), json!(breed));
        }
        if let Some(dob) = request.date_of_birth {
            update_data.insert("date_of_birth".to_string(), json!(dob));
        }
        if let Some(weight) = request.weight_kg {
            if weight <= 0.0 {
                return Err(PetError::ValidationError(
                    "Weight must be positive".to_string(),
                ));
            }
            update_data.insert("weight_kg".to_string(), json!(weight));
        }
        if let Some(sex) = request.sex {
            update_data.insert("sex".to_string(), json!(sex));
        }
        if let Some(microchip) = request.microchip_id {
            update_data.insert("microchip_id".to_string(), json!(microchip));
        }
        if let Some(notes) = request.medical_notes {
            update_data.insert("medical_notes".to_string(), json!(notes));
        }

        if update_data.is_empty() {
            return Err(PetError::ValidationError("No fields to update".to_string()));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/pets?id=eq.{}", pet_id);
        let result: Vec<Value> = self
            .patch_returning(&path, Value::Object(update_data), auth_token)
            .await?;

        parse_single_pet(result)
    }

    pub async fn add_vaccination(
        &self,
        pet_id: Uuid,
        request: AddVaccinationRequest,
        auth_token: &str,
    ) -> Result<Pet, PetError> {
        debug!("Adding vaccination record to pet {}", pet_id);

        if request.vaccine.trim().is_empty() {
            return Err(PetError::ValidationError(
                "Vaccine name cannot be empty".to_string(),
            ));
        }

        let mut pet = self.get_pet(pet_id, auth_token).await?;
        pet.vaccinations.push(VaccinationRecord {
            vaccine: request.vaccine,
            administered_on: request.administered_on,
            expires_on: request.expires_on,
            administered_by: request.administered_by,
        });

        let path = format!("/rest/v1/pets?id=eq.{}", pet_id);
        let update = json!({
            "vaccinations": pet.vaccinations,
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self.patch_returning(&path, update, auth_token).await?;
        parse_single_pet(result)
    }

    pub async fn delete_pet(&self, pet_id: Uuid, auth_token: &str) -> Result<(), PetError> {
        debug!("Deleting pet {}", pet_id);

        // A pet with upcoming active appointments stays on the books
        let now = Utc::now().to_rfc3339();
        let path = format!(
            "/rest/v1/appointments?pet_id=eq.{}&scheduled_start_time=gte.{}&status=in.(pending,confirmed,in_progress)",
            pet_id, now
        );

        let upcoming: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PetError::DatabaseError(e.to_string()))?;

        if !upcoming.is_empty() {
            warn!(
                "Refusing to delete pet {} with {} upcoming appointments",
                pet_id,
                upcoming.len()
            );
            return Err(PetError::HasActiveAppointments);
        }

        let delete_path = format!("/rest/v1/pets?id=eq.{}", pet_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &delete_path, Some(auth_token), None, Some(headers))
            .await
            .map_err(|e| PetError::DatabaseError(e.to_string()))?;

        if deleted.is_empty() {
            return Err(PetError::NotFound);
        }

        Ok(())
    }

    async fn insert_returning(
        &self,
        path: &str,
        body: Value,
        auth_token: &str,
    ) -> Result<Vec<Value>, PetError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        self.supabase
            .request_with_headers(Method::POST, path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| PetError::DatabaseError(e.to_string()))
    }

    async fn patch_returning(
        &self,
        path: &str,
        body: Value,
        auth_token: &str,
    ) -> Result<Vec<Value>, PetError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        self.supabase
            .request_with_headers(Method::PATCH, path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| PetError::DatabaseError(e.to_string()))
    }
}

fn parse_single_pet(result: Vec<Value>) -> Result<Pet, PetError> {
    let row = result.into_iter().next().ok_or(PetError::NotFound)?;
    serde_json::from_value(row)
        .map_err(|e| PetError::DatabaseError(format!("Failed to parse pet: {}", e)))
}
