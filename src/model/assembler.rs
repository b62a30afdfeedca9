//! Incremental model assembly.
//!
//! Every `add_*` operation is an idempotent upsert: the entity keyed by the
//! event is looked up, created on first sight, and then updated. Provenance
//! (the assembler's source label) is recorded in the [`SourceModel`] for every
//! entity touched. Upserts run under the model's write lock, so one assembler
//! may be shared by several reader threads without duplicating entities.

use crate::error::{Result, TraceScopeError};
use crate::model::execution::{
    DataflowDirection, ExecutionModel, Invocation, InvocationStatistics, OperationDataflow,
    StorageDataflow,
};
use crate::model::signature::{resolve_operation, SignatureExtractor};
use crate::model::source::{ModelEntity, SourceModel};
use crate::model::types::{OperationRef, StorageRef, TypeModel};
use crate::model::SharedModel;
use crate::trace::OperationEvent;
use std::sync::{Arc, RwLockWriteGuard};

/// Whether an upsert created the entity or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

impl Upsert {
    fn from_created(created: bool) -> Self {
        if created {
            Upsert::Created
        } else {
            Upsert::Updated
        }
    }

    pub fn is_created(self) -> bool {
        self == Upsert::Created
    }
}

fn write<'a, T>(model: &'a SharedModel<T>, what: &str) -> Result<RwLockWriteGuard<'a, T>> {
    model
        .write()
        .map_err(|e| TraceScopeError::Model(format!("Failed to acquire {} lock: {}", what, e)))
}

/// Builds the [`TypeModel`] from operation events.
pub struct TypeModelAssembler {
    model: SharedModel<TypeModel>,
    sources: SharedModel<SourceModel>,
    extractor: Arc<dyn SignatureExtractor>,
    source_label: String,
}

impl TypeModelAssembler {
    pub fn new(
        model: SharedModel<TypeModel>,
        sources: SharedModel<SourceModel>,
        extractor: Arc<dyn SignatureExtractor>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            model,
            sources,
            extractor,
            source_label: source_label.into(),
        }
    }

    pub fn model(&self) -> &SharedModel<TypeModel> {
        &self.model
    }

    /// Look up or create the component and, within it, the operation of `event`.
    pub fn add_operation(&self, event: &OperationEvent) -> Result<(OperationRef, Upsert)> {
        let op = resolve_operation(self.extractor.as_ref(), event);

        let mut model = write(&self.model, "type model")?;
        let (component, component_created) = model.ensure_component(&op.component);
        let operation_created = component.ensure_operation(&op.operation);
        if component_created {
            tracing::debug!(component = %op.component, "New component");
        }

        let mut sources = write(&self.sources, "source model")?;
        sources.add_source(
            ModelEntity::Component {
                signature: op.component.clone(),
            },
            &self.source_label,
        );
        sources.add_source(
            ModelEntity::Operation {
                operation: op.clone(),
            },
            &self.source_label,
        );

        Ok((op, Upsert::from_created(operation_created)))
    }
}

/// Builds the [`ExecutionModel`] from operation calls and dataflows.
pub struct ExecutionModelAssembler {
    model: SharedModel<ExecutionModel>,
    sources: SharedModel<SourceModel>,
    source_label: String,
}

impl ExecutionModelAssembler {
    pub fn new(
        model: SharedModel<ExecutionModel>,
        sources: SharedModel<SourceModel>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            model,
            sources,
            source_label: source_label.into(),
        }
    }

    pub fn model(&self) -> &SharedModel<ExecutionModel> {
        &self.model
    }

    fn record_source(&self, entity: ModelEntity) -> Result<()> {
        write(&self.sources, "source model")?.add_source(entity, &self.source_label);
        Ok(())
    }

    /// Upsert the invocation `caller → callee` and account one call.
    pub fn add_operation_call(
        &self,
        caller: &OperationRef,
        callee: &OperationRef,
        duration_nanos: Option<i64>,
    ) -> Result<Upsert> {
        let mut model = write(&self.model, "execution model")?;
        let key = (caller.clone(), callee.clone());
        let created = !model.invocations.contains_key(&key);
        let invocation = model.invocations.entry(key).or_insert_with(|| Invocation {
            caller: caller.clone(),
            callee: callee.clone(),
            statistics: InvocationStatistics::default(),
        });
        invocation.statistics.record(duration_nanos);
        if created {
            tracing::debug!(%caller, %callee, "New invocation");
        }

        self.record_source(ModelEntity::Invocation {
            caller: caller.clone(),
            callee: callee.clone(),
        })?;
        Ok(Upsert::from_created(created))
    }

    pub fn add_operation_dataflow(
        &self,
        source: &OperationRef,
        target: &OperationRef,
        direction: DataflowDirection,
    ) -> Result<Upsert> {
        let mut model = write(&self.model, "execution model")?;
        let key = (source.clone(), target.clone());
        let created = !model.operation_dataflows.contains_key(&key);
        let dataflow = model
            .operation_dataflows
            .entry(key)
            .or_insert_with(|| OperationDataflow {
                source: source.clone(),
                target: target.clone(),
                direction,
                statistics: InvocationStatistics::default(),
            });
        dataflow.direction = dataflow.direction.merge(direction);
        dataflow.statistics.record(None);

        self.record_source(ModelEntity::OperationDataflow {
            source: source.clone(),
            target: target.clone(),
        })?;
        Ok(Upsert::from_created(created))
    }

    pub fn add_storage_dataflow(
        &self,
        source: &OperationRef,
        storage: &StorageRef,
        direction: DataflowDirection,
    ) -> Result<Upsert> {
        let mut model = write(&self.model, "execution model")?;
        let key = (source.clone(), storage.clone());
        let created = !model.storage_dataflows.contains_key(&key);
        let dataflow = model
            .storage_dataflows
            .entry(key)
            .or_insert_with(|| StorageDataflow {
                source: source.clone(),
                storage: storage.clone(),
                direction,
                statistics: InvocationStatistics::default(),
            });
        dataflow.direction = dataflow.direction.merge(direction);
        dataflow.statistics.record(None);

        self.record_source(ModelEntity::StorageDataflow {
            source: source.clone(),
            storage: storage.clone(),
        })?;
        Ok(Upsert::from_created(created))
    }
}
