use std::sync::Arc;

use image::RgbImage;
use shared::DiagnosisReport;

use super::{aggregator, ClassCatalog};
use crate::config::AppConfig;
use crate::detection::Detector;
use crate::error::DiagnosisError;
use crate::imaging;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceSettings {
    pub reference_area: f64,
    pub jpeg_quality: u8,
    pub max_image_bytes: usize,
}

impl From<&AppConfig> for ServiceSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            reference_area: aggregator::reference_area(config.detector.input_size),
            jpeg_quality: config.report.jpeg_quality,
            max_image_bytes: config.max_image_bytes,
        }
    }
}

/// Decode → detect → assess → annotate → encode, for one image.
///
/// Everything here blocks; async callers go through `web::block`.
#[derive(Clone)]
pub struct DiagnosisService {
    detector: Arc<dyn Detector>,
    catalog: Arc<ClassCatalog>,
    settings: ServiceSettings,
}

impl DiagnosisService {
    pub fn new(detector: Arc<dyn Detector>, catalog: ClassCatalog, settings: ServiceSettings) -> Self {
        Self {
            detector,
            catalog: Arc::new(catalog),
            settings,
        }
    }

    pub fn from_config(detector: Arc<dyn Detector>, config: &AppConfig) -> Self {
        Self::new(detector, config.catalog(), ServiceSettings::from(config))
    }

    pub fn model_loaded(&self) -> bool {
        self.detector.is_loaded()
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn diagnose_bytes(&self, bytes: &[u8]) -> Result<DiagnosisReport, DiagnosisError> {
        let image = imaging::decode_image_bytes(bytes, self.settings.max_image_bytes)?;
        self.diagnose_image(&image)
    }

    pub fn diagnose_base64(&self, payload: &str) -> Result<DiagnosisReport, DiagnosisError> {
        let bytes = imaging::decode_base64_payload(payload)?;
        self.diagnose_bytes(&bytes)
    }

    pub fn diagnose_image(&self, image: &RgbImage) -> Result<DiagnosisReport, DiagnosisError> {
        let detections = self.detector.detect(image)?;
        let assessment =
            aggregator::assess(&detections, &self.catalog, self.settings.reference_area)?;

        let annotated_image = if detections.is_empty() {
            imaging::encode_jpeg_base64(image, self.settings.jpeg_quality)?
        } else {
            let annotated = self.detector.annotate(image, &detections, &self.catalog);
            imaging::encode_jpeg_base64(&annotated, self.settings.jpeg_quality)?
        };

        log::debug!(
            "Assessed {} regions: {} ({:.2}%)",
            assessment.issues.len(),
            assessment.severity_level,
            assessment.severity_ratio
        );
        Ok(assessment.into_report(annotated_image))
    }
}
