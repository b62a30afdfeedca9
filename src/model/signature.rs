//! Signature extraction strategies.
//!
//! Assemblers never interpret raw event strings themselves; they ask a
//! [`SignatureExtractor`] for the component and operation signature of an
//! event. Swapping the strategy changes how entities are keyed without
//! touching the assembly logic.
//!
//! ## Scripted extraction
//!
//! [`ScriptedSignatureExtractor`] evaluates two Rhai scripts. Each script sees:
//! - `component` - the raw component signature
//! - `operation` - the raw operation signature
//! - `host` - the host name
//!
//! and must return a string. For example, to drop the package prefix:
//!
//! ```text
//! let parts = component.split(".");
//! parts[parts.len() - 1]
//! ```

use crate::error::{Result, ResultExt, TraceScopeError};
use crate::model::types::{normalize_signature, OperationRef};
use crate::trace::OperationEvent;
use rhai::{Dynamic, Engine, Scope, AST};

/// Two-method capability that turns an event into model keys.
#[cfg_attr(test, mockall::automock)]
pub trait SignatureExtractor: Send + Sync {
    fn component_signature(&self, event: &OperationEvent) -> String;

    fn operation_signature(&self, event: &OperationEvent) -> String;
}

/// Resolve the normalized [`OperationRef`] of an event.
pub fn resolve_operation(extractor: &dyn SignatureExtractor, event: &OperationEvent) -> OperationRef {
    OperationRef::new(
        normalize_signature(&extractor.component_signature(event)),
        normalize_signature(&extractor.operation_signature(event)),
    )
}

/// Uses the raw signatures unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentitySignatureExtractor;

impl SignatureExtractor for IdentitySignatureExtractor {
    fn component_signature(&self, event: &OperationEvent) -> String {
        event.component_signature.clone()
    }

    fn operation_signature(&self, event: &OperationEvent) -> String {
        event.operation_signature.clone()
    }
}

/// Extracts signatures with user-provided Rhai scripts.
///
/// A script that fails at runtime falls back to the raw signature, so a
/// faulty script never drops events.
pub struct ScriptedSignatureExtractor {
    engine: Engine,
    component_script: AST,
    operation_script: AST,
}

impl ScriptedSignatureExtractor {
    /// Compile both scripts. Fails on syntax errors.
    pub fn new(component_script: &str, operation_script: &str) -> Result<Self> {
        let mut engine = Engine::new();
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);

        let component_script = engine
            .compile(component_script)
            .map_err(|e| TraceScopeError::Script(format!("Component script: {}", e)))?;
        let operation_script = engine
            .compile(operation_script)
            .map_err(|e| TraceScopeError::Script(format!("Operation script: {}", e)))?;

        Ok(Self {
            engine,
            component_script,
            operation_script,
        })
    }

    fn evaluate(&self, ast: &AST, event: &OperationEvent) -> Result<String> {
        let mut scope = Scope::new();
        scope.push("component", event.component_signature.clone());
        scope.push("operation", event.operation_signature.clone());
        scope.push("host", event.host_name.clone());

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .context("Signature script failed")?;
        value
            .into_string()
            .map_err(|ty| TraceScopeError::Script(format!("Script must return a string, got {}", ty)))
    }
}

impl SignatureExtractor for ScriptedSignatureExtractor {
    fn component_signature(&self, event: &OperationEvent) -> String {
        self.evaluate(&self.component_script, event).unwrap_or_else(|e| {
            tracing::warn!("{}; using raw component signature", e);
            event.component_signature.clone()
        })
    }

    fn operation_signature(&self, event: &OperationEvent) -> String {
        self.evaluate(&self.operation_script, event).unwrap_or_else(|e| {
            tracing::warn!("{}; using raw operation signature", e);
            event.operation_signature.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(component: &str, operation: &str) -> OperationEvent {
        OperationEvent {
            host_name: "srv0".to_string(),
            component_signature: component.to_string(),
            operation_signature: operation.to_string(),
        }
    }

    #[test]
    fn test_identity_extractor() {
        let op = resolve_operation(&IdentitySignatureExtractor, &event("org.A", " f() "));
        assert_eq!(op, OperationRef::new("org.A", "f()"));
    }

    #[test]
    fn test_empty_signature_resolves_to_placeholder() {
        let op = resolve_operation(&IdentitySignatureExtractor, &event("", "f()"));
        assert_eq!(op.component, crate::model::types::UNKNOWN_SIGNATURE);
    }

    #[test]
    fn test_scripted_extractor() {
        let extractor = ScriptedSignatureExtractor::new(
            r#"let parts = component.split("."); parts[parts.len() - 1]"#,
            r#"host + ":" + operation"#,
        )
        .unwrap();
        let e = event("org.shop.Cart", "add()");
        assert_eq!(extractor.component_signature(&e), "Cart");
        assert_eq!(extractor.operation_signature(&e), "srv0:add()");
    }

    #[test]
    fn test_scripted_extractor_falls_back_on_non_string() {
        let extractor = ScriptedSignatureExtractor::new("42", "operation").unwrap();
        let e = event("A", "f()");
        assert_eq!(extractor.component_signature(&e), "A");
        assert_eq!(extractor.operation_signature(&e), "f()");
    }

    #[test]
    fn test_scripted_extractor_rejects_syntax_errors() {
        assert!(matches!(
            ScriptedSignatureExtractor::new("let = ;", "operation"),
            Err(TraceScopeError::Script(_))
        ));
    }
}
