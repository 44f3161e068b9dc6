use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AddVaccinationRequest, CreatePetRequest, PetError, UpdatePetRequest};
use crate::services::pet::PetService;

fn map_pet_error(e: PetError) -> AppError {
    match e {
        PetError::NotFound => AppError::NotFound("Pet not found".to_string()),
        PetError::HasActiveAppointments => {
            AppError::Conflict("Pet has upcoming appointments and cannot be deleted".to_string())
        }
        PetError::ValidationError(msg) => AppError::ValidationError(msg),
        PetError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn can_act_for_owner(user: &User, owner_id: Uuid) -> bool {
    user.is_admin() || user.id == owner_id.to_string()
}

#[axum::debug_handler]
pub async fn create_pet(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePetRequest>,
) -> Result<Json<Value>, AppError> {
    if !can_act_for_owner(&user, request.owner_id) {
        return Err(AppError::Forbidden(
            "Not authorized to create pets for this owner".to_string(),
        ));
    }

    let service = PetService::new(&state);
    let pet = service
        .create_pet(request, auth.token())
        .await
        .map_err(map_pet_error)?;

    Ok(Json(json!({ "success": true, "pet": pet })))
}

#[axum::debug_handler]
pub async fn get_pet(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(pet_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PetService::new(&state);
    let pet = service
        .get_pet(pet_id, auth.token())
        .await
        .map_err(map_pet_error)?;

    // Providers and clinics see pets through appointments/referrals; direct
    // reads are limited to the owner and admins.
    if !can_act_for_owner(&user, pet.owner_id) && !user.is_provider() && !user.is_clinic() {
        return Err(AppError::Forbidden("Not authorized to view this pet".to_string()));
    }

    Ok(Json(json!({ "pet": pet })))
}

#[axum::debug_handler]
pub async fn list_owner_pets(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !can_act_for_owner(&user, owner_id) {
        return Err(AppError::Forbidden(
            "Not authorized to list pets for this owner".to_string(),
        ));
    }

    let service = PetService::new(&state);
    let pets = service
        .list_owner_pets(owner_id, auth.token())
        .await
        .map_err(map_pet_error)?;

    let count = pets.len();
    Ok(Json(json!({ "pets": pets, "count": count })))
}

#[axum::debug_handler]
pub async fn update_pet(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(pet_id): Path<Uuid>,
    Json(request): Json<UpdatePetRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PetService::new(&state);

    let existing = service
        .get_pet(pet_id, auth.token())
        .await
        .map_err(map_pet_error)?;

    if !can_act_for_owner(&user, existing.owner_id) {
        return Err(AppError::Forbidden("Not authorized to update this pet".to_string()));
    }

    let pet = service
        .update_pet(pet_id, request, auth.token())
        .await
        .map_err(map_pet_error)?;

    Ok(Json(json!({ "success": true, "pet": pet })))
}

#[axum::debug_handler]
pub async fn add_vaccination(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(pet_id): Path<Uuid>,
    Json(request): Json<AddVaccinationRequest>,
) -> Result<Json<Value>, AppError> {
    let service = PetService::new(&state);

    let existing = service
        .get_pet(pet_id, auth.token())
        .await
        .map_err(map_pet_error)?;

    // Providers record vaccinations after a visit; owners keep their own records
    if !can_act_for_owner(&user, existing.owner_id) && !user.is_provider() {
        return Err(AppError::Forbidden(
            "Not authorized to add vaccinations for this pet".to_string(),
        ));
    }

    let pet = service
        .add_vaccination(pet_id, request, auth.token())
        .await
        .map_err(map_pet_error)?;

    Ok(Json(json!({ "success": true, "pet": pet })))
}

#[axum::debug_handler]
pub async fn delete_pet(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(pet_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PetService::new(&state);

    let existing = service
        .get_pet(pet_id, auth.token())
        .await
        .map_err(map_pet_error)?;

    if !can_act_for_owner(&user, existing.owner_id) {
        return Err(AppError::Forbidden("Not authorized to delete this pet".to_string()));
    }

    service
        .delete_pet(pet_id, auth.token())
        .await
        .map_err(map_pet_error)?;

    Ok(Json(json!({ "success": true })))
}
