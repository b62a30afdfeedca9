//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::sync::Arc;
use tracescope_rs::config::MonitoringConfig;
use tracescope_rs::model::{IdentitySignatureExtractor, SignatureExtractor};
use tracescope_rs::monitoring::{MemoryWriter, MonitoringController};

/// Controller writing into a fresh [`MemoryWriter`], with deterministic trace ids.
pub fn memory_controller(host: &str, first_trace_id: i64) -> (MonitoringController, MemoryWriter) {
    let writer = MemoryWriter::new();
    let config = MonitoringConfig {
        host_name: host.to_string(),
        initial_trace_id: Some(first_trace_id),
        ..MonitoringConfig::default()
    };
    let controller = MonitoringController::new(&config, Box::new(writer.clone()));
    (controller, writer)
}

pub fn identity_extractor() -> Arc<dyn SignatureExtractor> {
    Arc::new(IdentitySignatureExtractor)
}
