use axum::extract::{Multipart, State};
use serde::Deserialize;

use super::OkResponse;
use crate::credits::CreditKind;
use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::extractors::{CurrentUser, Json, Path};
use crate::models::{Measurement, NewMeasurement};
use crate::vision::ImageUpload;

/// Parsed multipart fields for a capture request.
struct CaptureRequest {
    front: ImageUpload,
    side: Option<ImageUpload>,
    profile: ImageUpload,
    height_cm: f64,
    fit_type: String,
}

async fn read_image(field: axum::extract::multipart::Field<'_>) -> Result<ImageUpload> {
    let filename = field.file_name().unwrap_or("upload.jpg").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {}", e)))?;
    Ok(ImageUpload {
        filename,
        bytes: bytes.to_vec(),
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid form field: {}", e)))
}

async fn parse_capture(mut multipart: Multipart) -> Result<CaptureRequest> {
    let mut front = None;
    let mut side = None;
    let mut profile = None;
    let mut height_cm = None;
    let mut fit_type = "Standard".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "front_image" => front = Some(read_image(field).await?),
            "side_image" => side = Some(read_image(field).await?),
            "profile_image" => profile = Some(read_image(field).await?),
            "height_cm" => {
                height_cm = Some(read_text(field).await?.parse::<f64>().map_err(|_| {
                    AppError::BadRequest("height_cm must be a number".into())
                })?)
            }
            "fit_type" => fit_type = read_text(field).await?,
            _ => {}
        }
    }

    let front = front.ok_or_else(|| AppError::BadRequest("front_image is required".into()))?;
    let profile =
        profile.ok_or_else(|| AppError::BadRequest("profile_image is required".into()))?;
    let height_cm =
        height_cm.ok_or_else(|| AppError::BadRequest("height_cm is required".into()))?;
    if !height_cm.is_finite() || height_cm <= 0.0 {
        return Err(AppError::BadRequest("height_cm must be positive".into()));
    }

    Ok(CaptureRequest {
        front,
        side,
        profile,
        height_cm,
        fit_type,
    })
}

/// Capture body measurements from uploaded photos.
///
/// Ordering matters: the credit gate runs before the expensive vision call so
/// an exhausted balance never costs an upstream request, but the
/// authoritative debit happens atomically with the insert afterwards, so a
/// failed upstream call never costs a credit.
pub async fn capture(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Measurement>> {
    let request = parse_capture(multipart).await?;

    {
        let conn = state.db.get()?;
        queries::get_user_by_id(&conn, &user.id)?.or_not_found(msg::USER_NOT_FOUND)?;
        if !queries::has_credits(&conn, &user.id, CreditKind::Measurement)? {
            return Err(AppError::InsufficientCredits(CreditKind::Measurement));
        }
    }

    let measured = state
        .vision
        .measure(
            request.front,
            request.side,
            request.profile,
            request.height_cm,
            &request.fit_type,
        )
        .await?;

    let input = NewMeasurement {
        thobe_length: measured.measurements.thobe_length,
        chest: measured.measurements.chest_circumference,
        sleeve: measured.measurements.sleeve_length,
        shoulder: measured.measurements.shoulder_width,
        height_cm: request.height_cm,
        front_image: measured.image_ids.front,
        side_image: measured.image_ids.side,
        profile_image: measured.image_ids.profile,
    };

    let mut conn = state.db.get()?;
    let measurement = queries::create_measurement_with_debit(&mut conn, &user.id, &input)?;
    Ok(Json(measurement))
}

pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Measurement>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_measurements_for_user(&conn, &user.id)?))
}

pub async fn get_one(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Measurement>> {
    let conn = state.db.get()?;
    let measurement = queries::get_measurement_for_user(&conn, &id, &user.id)?
        .or_not_found(msg::MEASUREMENT_NOT_FOUND)?;
    Ok(Json(measurement))
}

#[derive(Debug, Deserialize)]
pub struct MeasurementProfileImageRequest {
    pub profile_image_id: String,
}

pub async fn update_profile_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<MeasurementProfileImageRequest>,
) -> Result<Json<OkResponse>> {
    let conn = state.db.get()?;
    if !queries::set_measurement_profile_image(&conn, &id, &user.id, &request.profile_image_id)? {
        return Err(AppError::NotFound(msg::MEASUREMENT_NOT_FOUND.into()));
    }
    Ok(Json(OkResponse { ok: true }))
}
