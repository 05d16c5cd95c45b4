//! Turns detector output into a severity assessment.
//!
//! Severity is measured against the detector's square working canvas rather
//! than the upload's own resolution, and overlapping boxes are summed without
//! overlap correction.

use shared::{DetectedRegion, DiagnosisReport, ReportStatus, SeverityLevel};

use super::ClassCatalog;
use crate::detection::Detection;
use crate::error::DiagnosisError;

pub const HEALTHY_PRESCRIPTION: &str = "The plant is healthy. No lesions were detected.";

pub fn reference_area(input_size: u32) -> f64 {
    let side = input_size as f64;
    side * side
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub issues: Vec<DetectedRegion>,
    pub total_lesion_area: f64,
    /// Unrounded percentage; may exceed 100.
    pub severity_ratio: f64,
    pub severity_level: SeverityLevel,
    pub prescription_text: String,
}

impl Assessment {
    pub fn is_healthy(&self) -> bool {
        self.total_lesion_area == 0.0
    }

    pub fn into_report(self, annotated_image: String) -> DiagnosisReport {
        DiagnosisReport {
            status: ReportStatus::Success,
            severity_level: self.severity_level,
            severity_ratio: round2(self.severity_ratio),
            issues: self.issues,
            prescription_text: self.prescription_text,
            annotated_image,
        }
    }
}

pub fn assess(
    detections: &[Detection],
    catalog: &ClassCatalog,
    reference_area: f64,
) -> Result<Assessment, DiagnosisError> {
    let issues = detections
        .iter()
        .map(|det| to_region(det, catalog))
        .collect::<Result<Vec<_>, _>>()?;

    let total_lesion_area: f64 = issues.iter().map(|r| r.area).sum();
    let severity_ratio = severity_ratio(total_lesion_area, reference_area);
    let severity_level = SeverityLevel::from_ratio(severity_ratio);

    let prescription_text = match issues.first() {
        Some(headline) if total_lesion_area != 0.0 => format!(
            "{} infection detected. Severity: {} ({:.1}%)",
            headline.label, severity_level, severity_ratio
        ),
        _ => HEALTHY_PRESCRIPTION.to_string(),
    };

    Ok(Assessment {
        issues,
        total_lesion_area,
        severity_ratio,
        severity_level,
        prescription_text,
    })
}

pub fn severity_ratio(total_lesion_area: f64, reference_area: f64) -> f64 {
    if total_lesion_area == 0.0 || reference_area == 0.0 {
        0.0
    } else {
        total_lesion_area / reference_area * 100.0
    }
}

fn to_region(det: &Detection, catalog: &ClassCatalog) -> Result<DetectedRegion, DiagnosisError> {
    let label = catalog
        .label(det.class_id)
        .ok_or(DiagnosisError::UnknownClass {
            class_id: det.class_id,
            catalog_size: catalog.len(),
        })?;

    let bbox = det.bbox.map(f64::from);
    let area = (bbox[2] - bbox[0]) * (bbox[3] - bbox[1]);

    Ok(DetectedRegion {
        class_id: det.class_id as u32,
        label: label.to_string(),
        confidence: det.confidence,
        bbox,
        area,
    })
}

/// Exact halves go to the even neighbour.
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
