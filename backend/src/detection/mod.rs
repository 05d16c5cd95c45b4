pub mod draw;
pub mod postprocess;
#[cfg(feature = "torch")]
pub mod yolo;

use image::RgbImage;

use crate::diagnosis::ClassCatalog;

#[cfg(feature = "torch")]
pub use yolo::YoloDetector;

/// One box emitted by the detector, in the pixel space of the image it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    /// `[x_min, y_min, x_max, y_max]`
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Failed to load model from {path}: {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Unexpected model output shape {0:?}")]
    OutputShape(Vec<i64>),
    #[error("Model lock poisoned")]
    Poisoned,
}

/// Object detector shared read-only by every request.
///
/// `detect` must return an empty vector, not an error, when nothing is found.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError>;

    /// Copy of `image` with every detection outlined and captioned with its
    /// label and confidence.
    fn annotate(&self, image: &RgbImage, detections: &[Detection], catalog: &ClassCatalog) -> RgbImage {
        draw::draw_detections(image, detections, catalog)
    }

    fn is_loaded(&self) -> bool {
        true
    }
}
