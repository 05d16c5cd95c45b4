//! Model-independent YOLO pre/post-processing.
//!
//! The detector sees a square `input_size` canvas: the source image is resized
//! with its aspect ratio kept and centred on grey padding (letterbox). Raw
//! model output is a `[4 + classes, anchors]` matrix of centre-format boxes in
//! canvas pixels followed by per-class scores.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use super::Detection;

const PAD_VALUE: u8 = 114;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub gain: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn new(source_width: u32, source_height: u32, input_size: u32) -> Self {
        let gain = (input_size as f32 / source_width as f32)
            .min(input_size as f32 / source_height as f32);
        let scaled_w = (source_width as f32 * gain).round();
        let scaled_h = (source_height as f32 * gain).round();
        Self {
            gain,
            pad_x: (input_size as f32 - scaled_w) / 2.0,
            pad_y: (input_size as f32 - scaled_h) / 2.0,
            source_width,
            source_height,
        }
    }

    fn scaled_size(&self) -> (u32, u32) {
        (
            ((self.source_width as f32 * self.gain).round() as u32).max(1),
            ((self.source_height as f32 * self.gain).round() as u32).max(1),
        )
    }

    /// Maps a canvas box back to source pixels, clipped to the source bounds.
    pub fn restore(&self, bbox: [f32; 4]) -> [f32; 4] {
        let w = self.source_width as f32;
        let h = self.source_height as f32;
        [
            ((bbox[0] - self.pad_x) / self.gain).clamp(0.0, w),
            ((bbox[1] - self.pad_y) / self.gain).clamp(0.0, h),
            ((bbox[2] - self.pad_x) / self.gain).clamp(0.0, w),
            ((bbox[3] - self.pad_y) / self.gain).clamp(0.0, h),
        ]
    }
}

/// Letterboxes `image` and returns the normalised CHW float buffer.
pub fn preprocess(image: &RgbImage, input_size: u32) -> (Vec<f32>, Letterbox) {
    let letterbox = Letterbox::new(image.width(), image.height(), input_size);
    let (scaled_w, scaled_h) = letterbox.scaled_size();
    let resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.pad_x.floor() as i64,
        letterbox.pad_y.floor() as i64,
    );

    let plane = (input_size * input_size) as usize;
    let mut data = vec![0f32; plane * 3];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let idx = (y * input_size + x) as usize;
        for channel in 0..3 {
            data[channel * plane + idx] = pixel[channel] as f32 / 255.0;
        }
    }

    (data, letterbox)
}

/// Decodes candidates scoring at least `confidence_threshold`. Boxes stay in
/// canvas coordinates.
pub fn decode(output: ArrayView2<f32>, confidence_threshold: f32) -> Vec<Detection> {
    let (rows, anchors) = output.dim();
    if rows <= 4 {
        return Vec::new();
    }

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::MIN;
        for class_id in 0..rows - 4 {
            let score = output[[4 + class_id, anchor]];
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }

        if best_score < confidence_threshold {
            continue;
        }

        let cx = output[[0, anchor]];
        let cy = output[[1, anchor]];
        let w = output[[2, anchor]];
        let h = output[[3, anchor]];

        detections.push(Detection {
            class_id: best_class,
            confidence: best_score,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }

    detections
}

/// Per-class non-maximum suppression. Survivors come out sorted by
/// descending confidence, truncated to `max_detections`.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.bbox[0].max(b.bbox[0]);
    let y1 = a.bbox[1].max(b.bbox[1]);
    let x2 = a.bbox[2].min(b.bbox[2]);
    let y2 = a.bbox[3].min(b.bbox[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
