//! Source model: which analysis source contributed which model entity.

use crate::model::types::{OperationRef, StorageRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Key of any entity the assemblers create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelEntity {
    Component {
        signature: String,
    },
    Operation {
        operation: OperationRef,
    },
    Invocation {
        caller: OperationRef,
        callee: OperationRef,
    },
    OperationDataflow {
        source: OperationRef,
        target: OperationRef,
    },
    StorageDataflow {
        source: OperationRef,
        storage: StorageRef,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub sources: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceModel {
    entries: BTreeMap<ModelEntity, Provenance>,
}

impl SourceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `label` to the sources of `entity`. Returns `true` if the label was new.
    pub fn add_source(&mut self, entity: ModelEntity, label: &str) -> bool {
        let provenance = self.entries.entry(entity).or_insert_with(|| Provenance {
            sources: BTreeSet::new(),
            first_seen: Utc::now(),
        });
        if provenance.sources.contains(label) {
            return false;
        }
        provenance.sources.insert(label.to_string())
    }

    pub fn provenance(&self, entity: &ModelEntity) -> Option<&Provenance> {
        self.entries.get(entity)
    }

    pub fn sources_of(&self, entity: &ModelEntity) -> impl Iterator<Item = &str> {
        self.entries
            .get(entity)
            .into_iter()
            .flat_map(|p| p.sources.iter().map(String::as_str))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModelEntity, &Provenance)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_source_is_set_like() {
        let mut model = SourceModel::new();
        let entity = ModelEntity::Component {
            signature: "A".to_string(),
        };
        assert!(model.add_source(entity.clone(), "log-1"));
        assert!(!model.add_source(entity.clone(), "log-1"));
        assert!(model.add_source(entity.clone(), "log-2"));

        assert_eq!(model.len(), 1);
        let sources: Vec<&str> = model.sources_of(&entity).collect();
        assert_eq!(sources, vec!["log-1", "log-2"]);
    }

    #[test]
    fn test_entity_serializes_with_kind_tag() {
        let entity = ModelEntity::Invocation {
            caller: OperationRef::new("A", "f()"),
            callee: OperationRef::new("B", "g()"),
        };
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["kind"], "invocation");
        assert_eq!(json["callee"]["component"], "B");
    }
}
