use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub const DEFAULT_PLANT_NAME: &str = "Unknown Plant";

/// JSON body accepted by the serverless function and `/api/diagnose/json`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DiagnoseRequest {
    /// Base64 image, optionally prefixed with `data:image/...;base64,`.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(rename = "plantName", default)]
    pub plant_name: Option<String>,
}

impl DiagnoseRequest {
    pub fn plant_name(&self) -> &str {
        self.plant_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PLANT_NAME)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr)]
pub enum SeverityLevel {
    Healthy,
    Mild,
    Moderate,
    Severe,
}

impl SeverityLevel {
    /// Bands are upper-inclusive: 5.0 is Mild, 20.0 is Moderate.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 20.0 {
            SeverityLevel::Severe
        } else if ratio > 5.0 {
            SeverityLevel::Moderate
        } else if ratio > 0.0 {
            SeverityLevel::Mild
        } else {
            SeverityLevel::Healthy
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectedRegion {
    pub class_id: u32,
    pub label: String,
    pub confidence: f32,
    /// `[x_min, y_min, x_max, y_max]` in source image pixels.
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
    pub area: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiagnosisReport {
    pub status: ReportStatus,
    pub severity_level: SeverityLevel,
    pub severity_ratio: f64,
    pub issues: Vec<DetectedRegion>,
    pub prescription_text: String,
    pub annotated_image: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
