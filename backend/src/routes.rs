use actix_multipart::{Multipart, MultipartError};
use actix_web::{web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use shared::{DiagnosisReport, HealthResponse, DEFAULT_PLANT_NAME};
use uuid::Uuid;

use crate::diagnosis::DiagnosisService;
use crate::error::DiagnosisError;
use crate::imaging::ImageError;
use crate::serverless;

const IMAGE_FIELD: &str = "image";
const PLANT_NAME_FIELD: &str = "plantName";
const MAX_TEXT_FIELD_BYTES: usize = 1024;

pub const MALFORMED_MULTIPART_MESSAGE: &str = "Malformed multipart request";
pub const PLANT_NAME_TOO_LONG_MESSAGE: &str = "Plant name too long";

pub fn configure_routes(cfg: &mut web::ServiceConfig, max_image_bytes: usize) {
    // base64 inflates by 4/3, plus room for the JSON wrapper
    let json_limit = max_image_bytes / 3 * 4 + 64 * 1024;

    cfg.app_data(web::PayloadConfig::new(json_limit))
        .service(web::resource("/api/diagnose").route(web::post().to(handle_diagnose)))
        .service(web::resource("/api/diagnose/json").route(web::post().to(handle_diagnose_json)))
        .service(web::resource("/api/health").route(web::get().to(health_check)));
}

struct Upload {
    image: Option<Vec<u8>>,
    plant_name: String,
}

async fn read_upload(payload: &mut Multipart, max_image_bytes: usize) -> Result<Upload, DiagnosisError> {
    let mut upload = Upload {
        image: None,
        plant_name: DEFAULT_PLANT_NAME.to_string(),
    };

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned).unwrap_or_default();
        let limit = match name.as_str() {
            IMAGE_FIELD => max_image_bytes,
            PLANT_NAME_FIELD => MAX_TEXT_FIELD_BYTES,
            _ => {
                // drain fields we don't use without buffering them
                while let Some(chunk) = field.next().await {
                    chunk.map_err(multipart_error)?;
                }
                continue;
            }
        };

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(multipart_error)?;
            if data.len() + chunk.len() > limit {
                if name == IMAGE_FIELD {
                    return Err(ImageError::TooLarge(data.len() + chunk.len(), limit).into());
                }
                return Err(DiagnosisError::BadRequest(PLANT_NAME_TOO_LONG_MESSAGE.to_string()));
            }
            data.extend_from_slice(&chunk);
        }

        if name == IMAGE_FIELD {
            if !data.is_empty() {
                upload.image = Some(data);
            }
        } else {
            let plant_name = String::from_utf8_lossy(&data).trim().to_string();
            if !plant_name.is_empty() {
                upload.plant_name = plant_name;
            }
        }
    }

    Ok(upload)
}

/// A body that is not multipart at all carries no image field; only a
/// multipart stream that breaks while reading is malformed.
fn multipart_error(err: MultipartError) -> DiagnosisError {
    match err {
        MultipartError::ContentTypeMissing
        | MultipartError::ContentTypeParse
        | MultipartError::ContentTypeIncompatible => {
            info!("Non-multipart upload: {}", err);
            DiagnosisError::MissingImage
        }
        err => {
            warn!("Malformed multipart payload: {}", err);
            DiagnosisError::BadRequest(MALFORMED_MULTIPART_MESSAGE.to_string())
        }
    }
}

async fn handle_diagnose(
    service: web::Data<DiagnosisService>,
    mut payload: Multipart,
) -> Result<HttpResponse, DiagnosisError> {
    let request_id = Uuid::new_v4();
    let max_image_bytes = service.settings().max_image_bytes;

    let result = async {
        let upload = read_upload(&mut payload, max_image_bytes).await?;
        let image = upload.image.ok_or(DiagnosisError::MissingImage)?;
        info!(
            "[{}] Diagnosing {} ({} bytes)",
            request_id,
            upload.plant_name,
            image.len()
        );

        let service = service.clone();
        run_blocking(move || service.diagnose_bytes(&image)).await
    }
    .await;

    respond(request_id, result)
}

async fn handle_diagnose_json(
    service: web::Data<DiagnosisService>,
    body: web::Bytes,
) -> Result<HttpResponse, DiagnosisError> {
    let request_id = Uuid::new_v4();

    let result = async {
        let request = serverless::parse_request(&body)?;
        info!("[{}] Diagnosing {} (json)", request_id, request.plant_name());

        let service = service.clone();
        run_blocking(move || serverless::diagnose_request(&service, &request)).await
    }
    .await;

    respond(request_id, result)
}

async fn run_blocking<F>(f: F) -> Result<DiagnosisReport, DiagnosisError>
where
    F: FnOnce() -> Result<DiagnosisReport, DiagnosisError> + Send + 'static,
{
    web::block(f)
        .await
        .map_err(|e| DiagnosisError::Blocking(e.to_string()))?
}

fn respond(
    request_id: Uuid,
    result: Result<DiagnosisReport, DiagnosisError>,
) -> Result<HttpResponse, DiagnosisError> {
    match result {
        Ok(report) => {
            info!(
                "[{}] Diagnosis complete: {} {:.2}% ({} issues)",
                request_id,
                report.severity_level,
                report.severity_ratio,
                report.issues.len()
            );
            Ok(HttpResponse::Ok().json(report))
        }
        Err(e @ (DiagnosisError::MissingImage | DiagnosisError::BadRequest(_))) => {
            warn!("[{}] Rejected request: {}", request_id, e);
            Err(e)
        }
        Err(e) => {
            error!("[{}] Diagnosis error: {:?}", request_id, e);
            Err(e)
        }
    }
}

async fn health_check(service: web::Data<DiagnosisService>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: service.model_loaded(),
    })
}
