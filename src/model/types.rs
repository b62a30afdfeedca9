//! Type model: components and the operations they declare.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder signature for events whose signature normalizes to empty.
pub const UNKNOWN_SIGNATURE: &str = "<unknown>";

/// Map an extracted signature to its canonical form.
pub fn normalize_signature(signature: &str) -> String {
    let trimmed = signature.trim();
    if trimmed.is_empty() {
        UNKNOWN_SIGNATURE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Identity of an operation: component signature plus operation signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationRef {
    pub component: String,
    pub operation: String,
}

impl OperationRef {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for OperationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.operation)
    }
}

/// Identity of a storage (database table, file, shared variable...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageRef {
    pub name: String,
}

impl StorageRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationType {
    pub signature: String,
    pub name: String,
    pub return_type: Option<String>,
    pub parameter_types: Vec<String>,
}

impl OperationType {
    /// Derive name, return type and parameter types from a signature such as
    /// `public int add(int a, int b)`. Unparseable parts are left empty.
    pub fn from_signature(signature: &str) -> Self {
        let (head, params) = match signature.find('(') {
            Some(open) => {
                let close = signature.rfind(')').filter(|&c| c > open).unwrap_or(signature.len());
                (&signature[..open], &signature[open + 1..close])
            }
            None => (signature, ""),
        };
        let mut tokens: Vec<&str> = head.split_whitespace().collect();
        let name = tokens.pop().unwrap_or(signature).to_string();
        let return_type = tokens.pop().map(str::to_string);
        let parameter_types = params
            .split(',')
            .filter_map(|p| p.split_whitespace().next())
            .map(str::to_string)
            .collect();

        Self {
            signature: signature.to_string(),
            name,
            return_type,
            parameter_types,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentType {
    pub signature: String,
    pub name: String,
    pub package: Option<String>,
    operations: BTreeMap<String, OperationType>,
}

impl ComponentType {
    /// `a.b.Service` becomes package `a.b`, name `Service`.
    pub fn from_signature(signature: &str) -> Self {
        let (package, name) = match signature.rsplit_once('.') {
            Some((package, name)) if !package.is_empty() && !name.is_empty() => {
                (Some(package.to_string()), name.to_string())
            }
            _ => (None, signature.to_string()),
        };
        Self {
            signature: signature.to_string(),
            name,
            package,
            operations: BTreeMap::new(),
        }
    }

    pub fn operation(&self, signature: &str) -> Option<&OperationType> {
        self.operations.get(signature)
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationType> {
        self.operations.values()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Look up or create an operation in this component's namespace.
    /// Returns `true` if it was created.
    pub(crate) fn ensure_operation(&mut self, signature: &str) -> bool {
        if self.operations.contains_key(signature) {
            return false;
        }
        self.operations
            .insert(signature.to_string(), OperationType::from_signature(signature));
        true
    }
}

/// All components observed so far, keyed by signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeModel {
    components: BTreeMap<String, ComponentType>,
}

impl TypeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(&self, signature: &str) -> Option<&ComponentType> {
        self.components.get(signature)
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentType> {
        self.components.values()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn operation_count(&self) -> usize {
        self.components.values().map(ComponentType::operation_count).sum()
    }

    pub fn operation(&self, op: &OperationRef) -> Option<&OperationType> {
        self.component(&op.component)?.operation(&op.operation)
    }

    /// Look up or create a component. Returns the component and whether it
    /// was created.
    pub(crate) fn ensure_component(&mut self, signature: &str) -> (&mut ComponentType, bool) {
        let mut created = false;
        let component = self
            .components
            .entry(signature.to_string())
            .or_insert_with(|| {
                created = true;
                ComponentType::from_signature(signature)
            });
        (component, created)
    }
}
