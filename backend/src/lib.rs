pub mod config;
pub mod detection;
pub mod diagnosis;
pub mod error;
pub mod imaging;
pub mod routes;
pub mod serverless;

pub use config::AppConfig;
pub use detection::{Detection, DetectionError, Detector};
pub use diagnosis::{ClassCatalog, DiagnosisService};
pub use error::DiagnosisError;
