use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub species: Species,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
    pub sex: Option<PetSex>,
    pub microchip_id: Option<String>,
    pub medical_notes: Option<String>,
    #[serde(default)]
    pub vaccinations: Vec<VaccinationRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Dog,
    Cat,
    Bird,
    Rabbit,
    Reptile,
    Horse,
    Other,
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Species::Dog => write!(f, "dog"),
            Species::Cat => write!(f, "cat"),
            Species::Bird => write!(f, "bird"),
            Species::Rabbit => write!(f, "rabbit"),
            Species::Reptile => write!(f, "reptile"),
            Species::Horse => write!(f, "horse"),
            Species::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PetSex {
    Male,
    Female,
    MaleNeutered,
    FemaleSpayed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaccinationRecord {
    pub vaccine: String,
    pub administered_on: NaiveDate,
    pub expires_on: Option<NaiveDate>,
    pub administered_by: Option<String>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePetRequest {
    pub owner_id: Uuid,
    pub name: String,
    pub species: Species,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
    pub sex: Option<PetSex>,
    pub microchip_id: Option<String>,
    pub medical_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePetRequest {
    pub name: Option<String>,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
    pub sex: Option<PetSex>,
    pub microchip_id: Option<String>,
    pub medical_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddVaccinationRequest {
    pub vaccine: String,
    pub administered_on: NaiveDate,
    pub expires_on: Option<NaiveDate>,
    pub administered_by: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PetError {
    #[error("Pet not found")]
    NotFound,

    #[error("Pet has upcoming appointments and cannot be deleted")]
    HasActiveAppointments,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
