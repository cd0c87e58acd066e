use axum::extract::State;
use serde::Deserialize;

use super::OkResponse;
use crate::credits::CreditKind;
use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::extractors::{CurrentUser, Json, Path};
use crate::models::{Generation, GenerationWithMeasurement, NewGeneration, StyleConfig};
use crate::vision::TryOnParams;

#[derive(Debug, Deserialize)]
pub struct TryOnRequest {
    pub measurement_id: String,
    /// Durable reference to the profile photo held by the vision service.
    pub profile_image_id: String,
    pub fabric: String,
    pub pattern: String,
    pub style: String,
    pub closure: String,
    pub pocket: bool,
    #[serde(default)]
    pub extra_details: String,
}

/// Render a garment try-on for one of the caller's measurements.
///
/// Same ordering discipline as measurement capture: ownership and credit
/// checks before the upstream call, atomic debit + insert after it.
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<TryOnRequest>,
) -> Result<Json<Generation>> {
    {
        let conn = state.db.get()?;
        queries::get_measurement_for_user(&conn, &request.measurement_id, &user.id)?
            .or_not_found(msg::MEASUREMENT_NOT_FOUND)?;
        if !queries::has_credits(&conn, &user.id, CreditKind::Generation)? {
            return Err(AppError::InsufficientCredits(CreditKind::Generation));
        }
    }

    let rendered = state
        .vision
        .try_on(&TryOnParams {
            profile_image_id: request.profile_image_id.clone(),
            texture_id: request.fabric.clone(),
            pattern_id: request.pattern.clone(),
            style_config: request.style.clone(),
            closure_type: request.closure.clone(),
            has_pocket: request.pocket,
            extra_details: request.extra_details.clone(),
        })
        .await?;

    let config = StyleConfig {
        fabric: request.fabric,
        pattern: request.pattern,
        style: request.style,
        closure: request.closure,
        pocket: request.pocket,
    };

    let mut conn = state.db.get()?;
    let generation = queries::create_generation_with_debit(
        &mut conn,
        &user.id,
        &NewGeneration {
            measurement_id: request.measurement_id,
            image_url: rendered.image_url,
            config,
        },
    )?;
    Ok(Json(generation))
}

/// The caller's catalogue, newest first.
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<GenerationWithMeasurement>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_generations_for_user(&conn, &user.id)?))
}

pub async fn get_one(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<GenerationWithMeasurement>> {
    let conn = state.db.get()?;
    let generation = queries::get_generation_for_user(&conn, &id, &user.id)?
        .or_not_found(msg::GENERATION_NOT_FOUND)?;
    Ok(Json(generation))
}

pub async fn delete_one(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>> {
    let conn = state.db.get()?;
    if !queries::delete_generation_for_user(&conn, &id, &user.id)? {
        return Err(AppError::NotFound(msg::GENERATION_NOT_FOUND.into()));
    }
    Ok(Json(OkResponse { ok: true }))
}
