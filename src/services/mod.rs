// Upload pipeline
pub mod ingest;
pub mod report;
pub mod risk_classifier;

// Orchestration and alerting
pub mod waste_guard;

// External AI collaborator
pub mod insights;
