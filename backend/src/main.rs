use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use plantdoc::config::AppConfig;
use plantdoc::detection::yolo::{YoloDetector, YoloParams};
use plantdoc::diagnosis::DiagnosisService;
use plantdoc::routes::configure_routes;
use std::env;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let params = YoloParams::from(&config.detector);
    // No detector, no service: refuse to start rather than serve 500s.
    let detector = YoloDetector::load(&config.model_path, params).map_err(|e| {
        log::error!("Failed to load model at startup: {}", e);
        std::io::Error::other(format!("Model loading failed: {}", e))
    })?;

    let service = web::Data::new(DiagnosisService::from_config(Arc::new(detector), &config));
    let max_image_bytes = config.max_image_bytes;
    let cors_max_age = config.cors_max_age;
    let bind_address = config.bind_address();

    log::info!(
        "Classes: {:?}, confidence threshold {}",
        config.detector.class_names,
        config.detector.confidence_threshold
    );
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(cors_max_age),
            )
            .app_data(service.clone())
            .configure(|cfg| configure_routes(cfg, max_image_bytes))
    })
    .bind(&bind_address)?
    .run()
    .await
}
