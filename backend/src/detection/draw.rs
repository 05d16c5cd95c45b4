use std::sync::LazyLock;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::Detection;
use crate::diagnosis::ClassCatalog;

const PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [72, 249, 10],
    [0, 194, 255],
    [146, 204, 23],
];

const CAPTION_PADDING: i32 = 2;

static FONT: LazyLock<Option<FontArc>> = LazyLock::new(|| {
    match FontArc::try_from_slice(include_bytes!("../../assets/DejaVuSans.ttf")) {
        Ok(font) => Some(font),
        Err(e) => {
            log::warn!("Caption font unavailable, drawing boxes only: {}", e);
            None
        }
    }
});

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Outline width grows with the image so boxes stay visible on large photos.
pub fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

pub fn caption_scale(line_width: u32) -> PxScale {
    PxScale::from((line_width as f32 * 6.0).max(14.0))
}

/// `"{label} {confidence:.2}"`; unknown ids fall back to the number.
pub fn caption(det: &Detection, catalog: &ClassCatalog) -> String {
    match catalog.label(det.class_id) {
        Some(label) => format!("{} {:.2}", label, det.confidence),
        None => format!("{} {:.2}", det.class_id, det.confidence),
    }
}

/// Dark text on light boxes, white otherwise.
fn caption_text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 160.0 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

pub fn draw_detections(image: &RgbImage, detections: &[Detection], catalog: &ClassCatalog) -> RgbImage {
    let mut canvas = image.clone();
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return canvas;
    }
    let thickness = line_width(w, h);
    let scale = caption_scale(thickness);
    let thickness = thickness as i32;

    for det in detections {
        let x_min = (det.bbox[0].floor() as i32).clamp(0, w as i32 - 1);
        let y_min = (det.bbox[1].floor() as i32).clamp(0, h as i32 - 1);
        let x_max = (det.bbox[2].ceil() as i32).clamp(0, w as i32 - 1);
        let y_max = (det.bbox[3].ceil() as i32).clamp(0, h as i32 - 1);

        if x_min >= x_max || y_min >= y_max {
            continue;
        }

        let color = class_color(det.class_id);
        for t in 0..thickness {
            let rw = x_max - x_min + 1 - 2 * t;
            let rh = y_max - y_min + 1 - 2 * t;
            if rw <= 0 || rh <= 0 {
                break;
            }
            let rect = Rect::at(x_min + t, y_min + t).of_size(rw as u32, rh as u32);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }

        if let Some(font) = FONT.as_ref() {
            draw_caption(&mut canvas, font, scale, &caption(det, catalog), (x_min, y_min), color);
        }
    }

    canvas
}

/// Filled band with the caption, sitting on the box's top edge, or just
/// inside it when the box touches the top of the image.
fn draw_caption(
    canvas: &mut RgbImage,
    font: &FontArc,
    scale: PxScale,
    text: &str,
    (x, y): (i32, i32),
    color: Rgb<u8>,
) {
    let (text_w, _) = text_size(scale, font, text);
    let band_w = text_w + 2 * CAPTION_PADDING as u32;
    let band_h = scale.y.ceil() as u32 + 2 * CAPTION_PADDING as u32;

    let top = if y >= band_h as i32 { y - band_h as i32 } else { y };
    draw_filled_rect_mut(canvas, Rect::at(x, top).of_size(band_w, band_h), color);
    draw_text_mut(
        canvas,
        caption_text_color(color),
        x + CAPTION_PADDING,
        top + CAPTION_PADDING,
        scale,
        font,
        text,
    );
}
