use serde::{Deserialize, Serialize};

use super::Measurement;

/// Styling choices for a rendered garment. Opaque to the ledger and order
/// machinery; stored as a JSON blob and snapshotted onto order items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    pub fabric: String,
    pub pattern: String,
    pub style: String,
    pub closure: String,
    pub pocket: bool,
}

/// A try-on render, anchored to the measurement it was generated from.
#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub id: String,
    pub user_id: String,
    pub measurement_id: String,
    pub image_url: String,
    pub config: StyleConfig,
    pub created_at: i64,
}

/// Generation joined with its measurement, as the catalogue endpoints return.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationWithMeasurement {
    #[serde(flatten)]
    pub generation: Generation,
    pub measurement: Measurement,
}

#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub measurement_id: String,
    pub image_url: String,
    pub config: StyleConfig,
}
