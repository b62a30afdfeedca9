//! Architectural models assembled from traces.
//!
//! - [`TypeModel`]: components and their operations
//! - [`ExecutionModel`]: caller → callee invocations, operation and storage dataflows
//! - [`SourceModel`]: which source contributed each entity
//!
//! Models are shared between assembler stages and readers as
//! [`SharedModel`]; consumers read them through the read lock or take a
//! serializable [`ModelSnapshot`].

pub mod assembler;
pub mod execution;
pub mod signature;
pub mod source;
pub mod types;

pub use assembler::{ExecutionModelAssembler, TypeModelAssembler, Upsert};
pub use execution::{
    DataflowDirection, ExecutionModel, Invocation, InvocationStatistics, OperationDataflow,
    StorageDataflow,
};
pub use signature::{IdentitySignatureExtractor, ScriptedSignatureExtractor, SignatureExtractor};
pub use source::{ModelEntity, Provenance, SourceModel};
pub use types::{ComponentType, OperationRef, OperationType, StorageRef, TypeModel, UNKNOWN_SIGNATURE};

use crate::error::{Result, TraceScopeError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// A model shared between assemblers and consumers.
pub type SharedModel<T> = Arc<RwLock<T>>;

pub fn shared<T>(model: T) -> SharedModel<T> {
    Arc::new(RwLock::new(model))
}

/// The three models of one analysis run.
#[derive(Clone, Default)]
pub struct ModelSet {
    pub types: SharedModel<TypeModel>,
    pub execution: SharedModel<ExecutionModel>,
    pub sources: SharedModel<SourceModel>,
}

impl ModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current state into a serializable snapshot.
    pub fn snapshot(&self) -> Result<ModelSnapshot> {
        let poisoned = |e: String| TraceScopeError::Model(format!("Failed to read model: {}", e));
        let types = self.types.read().map_err(|e| poisoned(e.to_string()))?;
        let execution = self.execution.read().map_err(|e| poisoned(e.to_string()))?;
        let sources = self.sources.read().map_err(|e| poisoned(e.to_string()))?;

        Ok(ModelSnapshot {
            components: types.components().cloned().collect(),
            invocations: execution.invocations().cloned().collect(),
            operation_dataflows: execution.operation_dataflows().cloned().collect(),
            storage_dataflows: execution.storage_dataflows().cloned().collect(),
            sources: sources
                .iter()
                .map(|(entity, provenance)| SourceEntry {
                    entity: entity.clone(),
                    provenance: provenance.clone(),
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub entity: ModelEntity,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Point-in-time copy of all models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub components: Vec<ComponentType>,
    pub invocations: Vec<Invocation>,
    pub operation_dataflows: Vec<OperationDataflow>,
    pub storage_dataflows: Vec<StorageDataflow>,
    pub sources: Vec<SourceEntry>,
}

impl ModelSnapshot {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| TraceScopeError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes() {
        let models = ModelSet::new();
        let assembler =
            ExecutionModelAssembler::new(models.execution.clone(), models.sources.clone(), "test");
        assembler
            .add_operation_call(&OperationRef::new("A", "f()"), &OperationRef::new("B", "g()"), Some(3))
            .unwrap();

        let snapshot = models.snapshot().unwrap();
        assert_eq!(snapshot.invocations.len(), 1);
        assert_eq!(snapshot.sources.len(), 1);

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["invocations"][0]["caller"]["operation"], "f()");
        assert_eq!(json["sources"][0]["entity"]["kind"], "invocation");
        assert_eq!(json["sources"][0]["sources"][0], "test");
    }
}
