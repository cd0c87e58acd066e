//! HTTP client for the external vision service (measurement + try-on).
//!
//! The service is an opaque collaborator: multipart images in, JSON metrics
//! or a rendered image URL out. Every call is bounded by an explicit timeout,
//! and failures surface as `AppError::Upstream` with a safe summary - the
//! caller's credit is only debited after a response has been persisted.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};

const API_KEY_HEADER: &str = "X-Thoub-API-Key";

/// Vision calls run a full pose/render pipeline upstream; allow well over
/// typical interactive latency before giving up.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    base_url: String,
    api_key: String,
}

/// An uploaded image forwarded to the vision service.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct MeasureResponse {
    pub measurements: BodyMetrics,
    pub image_ids: ImageIds,
}

/// The four metrics the measurement pipeline produces, in centimetres.
#[derive(Debug, Deserialize)]
pub struct BodyMetrics {
    pub thobe_length: f64,
    pub shoulder_width: f64,
    pub sleeve_length: f64,
    pub chest_circumference: f64,
}

/// Durable references for the uploaded images, as stored by the service.
#[derive(Debug, Deserialize)]
pub struct ImageIds {
    pub front: String,
    pub side: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TryOnResponse {
    pub image_url: String,
}

#[derive(Debug, Clone)]
pub struct TryOnParams {
    pub profile_image_id: String,
    pub texture_id: String,
    pub pattern_id: String,
    pub style_config: String,
    pub closure_type: String,
    pub has_pocket: bool,
    pub extra_details: String,
}

impl VisionClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Submit body photos for measurement extraction.
    pub async fn measure(
        &self,
        front: ImageUpload,
        side: Option<ImageUpload>,
        profile: ImageUpload,
        height_cm: f64,
        fit_type: &str,
    ) -> Result<MeasureResponse> {
        let mut form = Form::new()
            .part("front_image", image_part(front))
            .part("profile_image", image_part(profile))
            .text("height_cm", height_cm.to_string())
            .text("fit_type", fit_type.to_string());
        if let Some(side) = side {
            form = form.part("side_image", image_part(side));
        }

        let response = self
            .client
            .post(format!("{}/measure", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_error("measurement", &e))?;

        parse_response(response, "measurement").await
    }

    /// Submit a profile image plus styling fields for a try-on render.
    pub async fn try_on(&self, params: &TryOnParams) -> Result<TryOnResponse> {
        let form = Form::new()
            .text("profile_image_id", params.profile_image_id.clone())
            .text("texture_id", params.texture_id.clone())
            .text("pattern_id", params.pattern_id.clone())
            .text("style_config", params.style_config.clone())
            .text("closure_type", params.closure_type.clone())
            .text("has_pocket", params.has_pocket.to_string())
            .text("extra_details", params.extra_details.clone());

        let response = self
            .client
            .post(format!("{}/try-on", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_error("try-on", &e))?;

        parse_response(response, "try-on").await
    }
}

fn image_part(image: ImageUpload) -> Part {
    Part::bytes(image.bytes).file_name(image.filename)
}

fn send_error(what: &str, e: &reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Upstream(format!("The {} service timed out", what))
    } else {
        tracing::error!("{} call failed: {}", what, e);
        AppError::Upstream(format!("The {} service is unreachable", what))
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        tracing::error!("{} call returned {}: {}", what, status, detail);
        return Err(AppError::Upstream(format!(
            "The {} service is currently unavailable",
            what
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AppError::Upstream(format!("Invalid {} service response: {}", what, e)))
}
