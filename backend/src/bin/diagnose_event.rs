//! Serverless entry point: one event JSON on stdin, one response envelope on
//! stdout.

use std::io::{self, Read, Write};
use std::sync::Arc;

use plantdoc::config::AppConfig;
use plantdoc::detection::yolo::{YoloDetector, YoloParams};
use plantdoc::diagnosis::DiagnosisService;
use plantdoc::serverless::{self, ServerlessEvent};

fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = AppConfig::load()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let params = YoloParams::from(&config.detector);
    let detector = YoloDetector::load(&config.model_path, params).map_err(|e| {
        log::error!("Failed to load model: {}", e);
        io::Error::other(e.to_string())
    })?;
    let service = DiagnosisService::from_config(Arc::new(detector), &config);

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let event: ServerlessEvent = serde_json::from_str(&input)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let response = serverless::handle_event(&service, &event);
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    Ok(())
}
