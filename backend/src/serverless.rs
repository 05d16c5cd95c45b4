//! Function-as-a-service adapter.
//!
//! Events carry the JSON body `{image, plantName}` with a base64 image; the
//! response is a `{statusCode, headers, body}` envelope whose body is the
//! same report JSON the HTTP endpoint returns.

use std::collections::{BTreeMap, HashMap};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use shared::{DiagnoseRequest, DiagnosisReport, ErrorResponse};
use uuid::Uuid;

use crate::diagnosis::DiagnosisService;
use crate::error::{DiagnosisError, INTERNAL_ERROR_MESSAGE};

pub const INVALID_BODY_MESSAGE: &str = "Invalid request body";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessEvent {
    pub http_method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ServerlessResponse {
    fn new(status_code: u16, body: String) -> Self {
        Self {
            status_code,
            headers: cors_headers(),
            body,
        }
    }

    fn with_json_body(status_code: u16, body: String) -> Self {
        let mut response = Self::new(status_code, body);
        response
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        response
    }

    fn json<T: Serialize>(status_code: u16, payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self::with_json_body(status_code, body),
            Err(e) => {
                log::error!("Failed to serialize response body: {}", e);
                let body = serde_json::json!({ "error": INTERNAL_ERROR_MESSAGE }).to_string();
                Self::with_json_body(500, body)
            }
        }
    }

    fn error(err: &DiagnosisError) -> Self {
        let body = serde_json::json!({ "error": err.client_message() }).to_string();
        Self::with_json_body(err.status(), body)
    }
}

/// Headers every envelope carries, including the empty preflight reply.
pub fn cors_headers() -> BTreeMap<String, String> {
    [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Content-Type"),
        ("Access-Control-Allow-Methods", "POST, OPTIONS"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn parse_request(body: &[u8]) -> Result<DiagnoseRequest, DiagnosisError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DiagnoseRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        log::warn!("Rejecting request body: {}", e);
        DiagnosisError::BadRequest(INVALID_BODY_MESSAGE.to_string())
    })
}

/// Shared by the serverless handler and the JSON HTTP endpoint.
pub fn diagnose_request(
    service: &DiagnosisService,
    request: &DiagnoseRequest,
) -> Result<DiagnosisReport, DiagnosisError> {
    match request.image.as_deref() {
        Some(image) if !image.trim().is_empty() => service.diagnose_base64(image),
        _ => Err(DiagnosisError::MissingImage),
    }
}

pub fn handle_event(service: &DiagnosisService, event: &ServerlessEvent) -> ServerlessResponse {
    match event.http_method.to_ascii_uppercase().as_str() {
        "OPTIONS" => return ServerlessResponse::new(200, String::new()),
        "POST" => {}
        other => {
            log::warn!("Rejecting {} request", other);
            return ServerlessResponse::json(
                405,
                &ErrorResponse {
                    error: METHOD_NOT_ALLOWED_MESSAGE.to_string(),
                },
            );
        }
    }

    let request_id = Uuid::new_v4();
    match diagnose_event(service, event, request_id) {
        Ok(report) => {
            log::info!(
                "[{}] Diagnosis complete: {} ({} issues)",
                request_id,
                report.severity_level,
                report.issues.len()
            );
            ServerlessResponse::json(200, &report)
        }
        Err(e) => {
            log::error!("[{}] Diagnosis failed: {}", request_id, e);
            ServerlessResponse::error(&e)
        }
    }
}

fn diagnose_event(
    service: &DiagnosisService,
    event: &ServerlessEvent,
    request_id: Uuid,
) -> Result<DiagnosisReport, DiagnosisError> {
    let raw = event.body.as_deref().unwrap_or_default();
    let body = if event.is_base64_encoded {
        STANDARD
            .decode(raw.trim())
            .map_err(|_| DiagnosisError::BadRequest(INVALID_BODY_MESSAGE.to_string()))?
    } else {
        raw.as_bytes().to_vec()
    };

    let request = parse_request(&body)?;
    log::info!("[{}] Diagnosing {}", request_id, request.plant_name());
    diagnose_request(service, &request)
}
