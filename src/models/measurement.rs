use serde::Serialize;

/// Anthropometric record produced by a successful vision capture.
///
/// Belongs to exactly one user; immutable after insert except for the later
/// attachment of a profile image reference.
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub id: String,
    pub user_id: String,
    pub thobe_length: f64,
    pub chest: f64,
    pub sleeve: f64,
    pub shoulder: f64,
    pub height_cm: f64,
    pub front_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    pub created_at: i64,
}

/// Values persisted after a successful vision capture.
#[derive(Debug, Clone)]
pub struct NewMeasurement {
    pub thobe_length: f64,
    pub chest: f64,
    pub sleeve: f64,
    pub shoulder: f64,
    pub height_cm: f64,
    pub front_image: String,
    pub side_image: Option<String>,
    pub profile_image: Option<String>,
}
