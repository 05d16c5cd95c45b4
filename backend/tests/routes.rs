use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use actix_web::{test, web, App};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use plantdoc::config::AppConfig;
use plantdoc::detection::{Detection, DetectionError, Detector};
use plantdoc::diagnosis::{DiagnosisService, HEALTHY_PRESCRIPTION};
use plantdoc::routes::configure_routes;
use serde_json::Value;
use shared::{DiagnosisReport, HealthResponse, ReportStatus, SeverityLevel};

const BOUNDARY: &str = "----plantdoc-test-boundary";

/// Returns a fixed detection list and counts how often it was asked.
struct ScriptedDetector {
    detections: Vec<Detection>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    fn new(detections: Vec<Detection>) -> Arc<Self> {
        Arc::new(Self {
            detections,
            calls: AtomicUsize::new(0),
        })
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

struct BrokenDetector;

impl Detector for BrokenDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        Err(DetectionError::Model("CUDA error: device-side assert triggered".into()))
    }
}

fn lesion(class_id: usize, bbox: [f32; 4]) -> Detection {
    Detection {
        class_id,
        confidence: 0.91,
        bbox,
    }
}

fn leaf_png() -> Vec<u8> {
    let image = RgbImage::from_pixel(80, 60, Rgb([34, 139, 34]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"leaf.png\"\r\nContent-Type: image/png\r\n\r\n",
                        name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(parts: &[Part]) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/diagnose")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(multipart_body(parts))
}

macro_rules! app_with {
    ($detector:expr) => {{
        let config = AppConfig::default();
        let service = DiagnosisService::from_config($detector, &config);
        let max_image_bytes = config.max_image_bytes;
        test::init_service(
            App::new()
                .app_data(web::Data::new(service))
                .configure(move |cfg| configure_routes(cfg, max_image_bytes)),
        )
        .await
    }};
}

#[actix_web::test]
async fn health_reports_model_loaded() {
    let app = app_with!(ScriptedDetector::new(vec![]));
    let req = test::TestRequest::get().uri("/api/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = test::read_body_json(resp).await;
    assert_eq!(health.status, "healthy");
    assert!(health.model_loaded);
}

#[actix_web::test]
async fn healthy_leaf_returns_original_image() {
    let png = leaf_png();
    let app = app_with!(ScriptedDetector::new(vec![]));
    let req = multipart_request(&[Part::File("image", &png), Part::Text("plantName", "Rose")]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let report: DiagnosisReport = test::read_body_json(resp).await;
    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(report.severity_level, SeverityLevel::Healthy);
    assert_eq!(report.severity_ratio, 0.0);
    assert!(report.issues.is_empty());
    assert_eq!(report.prescription_text, HEALTHY_PRESCRIPTION);

    let jpeg = STANDARD.decode(&report.annotated_image).unwrap();
    assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (80, 60));
}

#[actix_web::test]
async fn moderate_lesion_report_shape() {
    let png = leaf_png();
    let app = app_with!(ScriptedDetector::new(vec![lesion(0, [0.0, 0.0, 200.0, 200.0])]));
    let req = multipart_request(&[Part::File("image", &png)]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["severity_level"], "Moderate");
    assert_eq!(body["severity_ratio"], 9.77);
    assert_eq!(body["issues"][0]["class_id"], 0);
    assert_eq!(body["issues"][0]["label"], "Powdery Mildew");
    assert_eq!(body["issues"][0]["box"], serde_json::json!([0.0, 0.0, 200.0, 200.0]));
    assert_eq!(body["issues"][0]["area"], 40000.0);
    assert!(body["prescription_text"].as_str().unwrap().contains("Powdery Mildew"));
    assert!(body["annotated_image"].as_str().unwrap().len() > 0);
}

#[actix_web::test]
async fn small_lesion_is_mild() {
    let png = leaf_png();
    let app = app_with!(ScriptedDetector::new(vec![lesion(1, [0.0, 0.0, 50.0, 50.0])]));
    let req = multipart_request(&[Part::File("image", &png)]).to_request();
    let report: DiagnosisReport = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report.severity_ratio, 0.61);
    assert_eq!(report.severity_level, SeverityLevel::Mild);
    assert_eq!(report.issues[0].label, "Septoria_leaf_spot");
}

#[actix_web::test]
async fn missing_image_field_is_400() {
    let detector = ScriptedDetector::new(vec![]);
    let app = app_with!(detector.clone());
    let req = multipart_request(&[Part::Text("plantName", "Fern")]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, serde_json::json!({ "error": "No image file provided" }));
    assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn non_multipart_posts_report_missing_image() {
    let detector = ScriptedDetector::new(vec![]);
    let app = app_with!(detector.clone());
    let missing = serde_json::json!({ "error": "No image file provided" });

    let bare = test::TestRequest::post().uri("/api/diagnose").to_request();
    let resp = test::call_service(&app, bare).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, missing);

    let json = test::TestRequest::post()
        .uri("/api/diagnose")
        .set_json(serde_json::json!({ "plantName": "Basil" }))
        .to_request();
    let resp = test::call_service(&app, json).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, missing);

    assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn multipart_without_boundary_is_malformed() {
    let app = app_with!(ScriptedDetector::new(vec![]));
    let req = test::TestRequest::post()
        .uri("/api/diagnose")
        .insert_header(("content-type", "multipart/form-data"))
        .set_payload("not really multipart")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Malformed multipart request");
}

#[actix_web::test]
async fn long_plant_name_is_not_reported_as_large_image() {
    let png = leaf_png();
    let app = app_with!(ScriptedDetector::new(vec![]));
    let name = "Ficus ".repeat(400);
    let req = multipart_request(&[Part::Text("plantName", &name), Part::File("image", &png)])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Plant name too long");
}

#[actix_web::test]
async fn unrelated_fields_are_ignored() {
    let png = leaf_png();
    let app = app_with!(ScriptedDetector::new(vec![]));
    let notes = "n".repeat(8 * 1024);
    let req = multipart_request(&[
        Part::Text("notes", &notes),
        Part::File("image", &png),
        Part::Text("plantName", "Tomato"),
    ])
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn empty_image_field_counts_as_missing() {
    let app = app_with!(ScriptedDetector::new(vec![]));
    let req = multipart_request(&[Part::File("image", b"")]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn unknown_class_is_structured_500() {
    let png = leaf_png();
    let app = app_with!(ScriptedDetector::new(vec![lesion(42, [0.0, 0.0, 10.0, 10.0])]));
    let req = multipart_request(&[Part::File("image", &png)]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body,
        serde_json::json!({ "error": "Internal server error during diagnosis" })
    );
}

#[actix_web::test]
async fn detector_failure_does_not_leak_detail() {
    let png = leaf_png();
    let app = app_with!(Arc::new(BrokenDetector));
    let req = multipart_request(&[Part::File("image", &png)]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(!text.contains("CUDA"));
}

#[actix_web::test]
async fn undecodable_upload_is_500() {
    let app = app_with!(ScriptedDetector::new(vec![]));
    let req = multipart_request(&[Part::File("image", b"GIF? no, just text")]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
}

#[actix_web::test]
async fn failing_request_does_not_affect_the_next() {
    let png = leaf_png();
    let detector = ScriptedDetector::new(vec![]);
    let app = app_with!(detector.clone());

    let bad = multipart_request(&[Part::File("image", b"garbage bytes")]).to_request();
    assert_eq!(test::call_service(&app, bad).await.status(), 500);

    let good = multipart_request(&[Part::File("image", &png)]).to_request();
    assert_eq!(test::call_service(&app, good).await.status(), 200);
    assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn json_endpoint_converges_on_same_report() {
    let png = leaf_png();
    let app = app_with!(ScriptedDetector::new(vec![lesion(0, [0.0, 0.0, 200.0, 200.0])]));

    let multipart = multipart_request(&[Part::File("image", &png)]).to_request();
    let from_multipart: DiagnosisReport = test::call_and_read_body_json(&app, multipart).await;

    let json = test::TestRequest::post()
        .uri("/api/diagnose/json")
        .set_json(serde_json::json!({
            "image": format!("data:image/png;base64,{}", STANDARD.encode(&png)),
            "plantName": "Squash",
        }))
        .to_request();
    let from_json: DiagnosisReport = test::call_and_read_body_json(&app, json).await;

    assert_eq!(from_multipart, from_json);
}

#[actix_web::test]
async fn json_endpoint_rejects_bad_bodies() {
    let app = app_with!(ScriptedDetector::new(vec![]));

    let req = test::TestRequest::post()
        .uri("/api/diagnose/json")
        .set_payload("{\"image\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid request body");

    let req = test::TestRequest::post()
        .uri("/api/diagnose/json")
        .set_json(serde_json::json!({ "plantName": "Mint" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No image file provided");
}
