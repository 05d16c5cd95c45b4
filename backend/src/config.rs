use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::diagnosis::ClassCatalog;

pub const CONFIG_PATH_VAR: &str = "PLANTDOC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/plantdoc.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Read(String, #[source] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_path: String,
    pub detector: DetectorConfig,
    pub report: ReportConfig,
    pub max_image_bytes: usize,
    pub cors_max_age: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Must follow the label order the model was trained with.
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub jpeg_quality: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            model_path: "runs/detect/train/weights/best.torchscript".to_string(),
            detector: DetectorConfig::default(),
            report: ReportConfig::default(),
            max_image_bytes: 10 * 1024 * 1024,
            cors_max_age: 3600,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            class_names: vec!["Powdery Mildew".into(), "Septoria_leaf_spot".into()],
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { jpeg_quality: 85 }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file named by `PLANTDOC_CONFIG` (if it exists),
    /// then individual environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = env::var(CONFIG_PATH_VAR).ok();
        let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            log::info!("Loading configuration from {}", path);
            Self::from_yaml_file(&path)?
        } else {
            if explicit.is_some() {
                log::warn!("Config file {} not found, using defaults", path);
            }
            Self::default()
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_string(), e))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model_path) = lookup("MODEL_PATH") {
            self.model_path = model_path;
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", port.clone()))?;
        }
        if let Some(threshold) = lookup("CONFIDENCE_THRESHOLD") {
            self.detector.confidence_threshold = threshold
                .parse()
                .map_err(|_| ConfigError::Invalid("CONFIDENCE_THRESHOLD", threshold.clone()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let detector = &self.detector;
        if !(0.0..=1.0).contains(&detector.confidence_threshold) {
            return Err(ConfigError::Invalid(
                "confidence_threshold",
                detector.confidence_threshold.to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&detector.iou_threshold) {
            return Err(ConfigError::Invalid(
                "iou_threshold",
                detector.iou_threshold.to_string(),
            ));
        }
        if detector.input_size == 0 {
            return Err(ConfigError::Invalid("input_size", "0".into()));
        }
        if detector.class_names.is_empty() {
            return Err(ConfigError::Invalid("class_names", "empty".into()));
        }
        if !(1..=100).contains(&self.report.jpeg_quality) {
            return Err(ConfigError::Invalid(
                "jpeg_quality",
                self.report.jpeg_quality.to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn catalog(&self) -> ClassCatalog {
        ClassCatalog::new(self.detector.class_names.iter().cloned())
    }
}
