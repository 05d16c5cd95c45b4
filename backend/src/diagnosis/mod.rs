pub mod aggregator;
pub mod catalog;
pub mod service;

pub use aggregator::{assess, reference_area, Assessment, HEALTHY_PRESCRIPTION};
pub use catalog::ClassCatalog;
pub use service::{DiagnosisService, ServiceSettings};
