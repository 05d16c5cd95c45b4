use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::detection::DetectionError;
use crate::imaging::ImageError;

pub const MISSING_IMAGE_MESSAGE: &str = "No image file provided";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error during diagnosis";
pub const TOO_LARGE_MESSAGE: &str = "Image file too large";

/// Per-request failure. Only the client message leaves the process; the
/// `Display` form is for server logs.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("No image provided in request")]
    MissingImage,
    #[error("Malformed request: {0}")]
    BadRequest(String),
    #[error("Image error: {0}")]
    Image(#[from] ImageError),
    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),
    #[error("Detector returned class id {class_id} outside catalog of {catalog_size} labels")]
    UnknownClass { class_id: usize, catalog_size: usize },
    #[error("Blocking task failed: {0}")]
    Blocking(String),
}

impl DiagnosisError {
    pub fn client_message(&self) -> &str {
        match self {
            DiagnosisError::MissingImage => MISSING_IMAGE_MESSAGE,
            DiagnosisError::BadRequest(message) => message,
            DiagnosisError::Image(ImageError::TooLarge(_, _)) => TOO_LARGE_MESSAGE,
            _ => INTERNAL_ERROR_MESSAGE,
        }
    }

    pub fn status(&self) -> u16 {
        self.status_code().as_u16()
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.client_message().to_string(),
        }
    }
}

impl ResponseError for DiagnosisError {
    fn status_code(&self) -> StatusCode {
        match self {
            DiagnosisError::MissingImage | DiagnosisError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DiagnosisError::Image(ImageError::TooLarge(_, _)) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_error_response())
    }
}
