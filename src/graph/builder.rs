//! Materialize assembled models as a hierarchical graph.
//!
//! ```text
//! architecture
//! ├── A ──calls(3)──► B        component nodes, aggregated invocation edges
//! │   └── [A]                  child graph: operations of A
//! │       ├── A.f()
//! │       └── A.h()  ◄── A.f() calls within the component
//! └── B
//!     └── [B]
//!         └── B.g()
//! ```

use crate::graph::Graph;
use crate::model::{ExecutionModel, OperationRef, TypeModel};
use std::collections::BTreeMap;

/// Builds a component graph whose nodes expand into operation graphs.
#[derive(Debug, Clone)]
pub struct ModelGraphBuilder {
    label: String,
}

impl Default for ModelGraphBuilder {
    fn default() -> Self {
        Self::new("architecture")
    }
}

impl ModelGraphBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn build(&self, types: &TypeModel, execution: &ExecutionModel) -> Graph {
        let mut graph = Graph::new(self.label.clone());

        for component in types.components() {
            let node = graph.add_node(component.signature.clone(), component.name.clone());
            if let Some(package) = &component.package {
                node.set_property("package", package);
            }
            let child = node.create_child_graph();
            for op in component.operations() {
                let id = OperationRef::new(&component.signature, &op.signature).to_string();
                child.add_node(id, op.name.clone());
            }
        }

        // Invocations may reference operations the type model has not seen.
        for invocation in execution.invocations() {
            for op in [&invocation.caller, &invocation.callee] {
                ensure_operation_node(&mut graph, op);
            }
        }

        let mut component_calls: BTreeMap<(&str, &str), (u64, usize)> = BTreeMap::new();
        for invocation in execution.invocations() {
            let caller = &invocation.caller;
            let callee = &invocation.callee;
            let stats = &invocation.statistics;

            if caller.component == callee.component {
                let (caller_id, callee_id) = (caller.to_string(), callee.to_string());
                let edge = graph
                    .find_node_mut(&caller.component)
                    .and_then(|n| n.child_graph_mut())
                    .and_then(|child| {
                        child.add_edge(
                            format!("{}->{}", caller_id, callee_id),
                            &caller_id,
                            &callee_id,
                            "calls",
                        )
                    });
                if let Some(edge) = edge {
                    edge.set_property("count", stats.count);
                    if let Some(mean) = stats.mean_duration_nanos() {
                        edge.set_property("mean_duration_nanos", format!("{:.0}", mean));
                    }
                }
            }

            let entry = component_calls
                .entry((caller.component.as_str(), callee.component.as_str()))
                .or_insert((0, 0));
            entry.0 += stats.count;
            entry.1 += 1;
        }

        for ((caller, callee), (count, invocations)) in component_calls {
            if let Some(edge) = graph.add_edge(format!("{}->{}", caller, callee), caller, callee, "calls") {
                edge.set_property("count", count);
                edge.set_property("invocations", invocations);
            }
        }

        tracing::debug!(
            nodes = graph.nodes().len(),
            edges = graph.edges().len(),
            "Built model graph"
        );
        graph
    }
}

fn ensure_operation_node(graph: &mut Graph, op: &OperationRef) {
    if graph.find_node(&op.component).is_none() {
        graph.add_node(op.component.clone(), op.component.clone());
    }
    let id = op.to_string();
    if let Some(node) = graph.find_node_mut(&op.component) {
        let child = node.create_child_graph();
        if child.find_node(&id).is_none() {
            child.add_node(id, op.operation.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        shared, ExecutionModelAssembler, IdentitySignatureExtractor, SourceModel,
        TypeModelAssembler,
    };
    use crate::trace::OperationEvent;
    use std::sync::Arc;

    fn event(component: &str, operation: &str) -> OperationEvent {
        OperationEvent {
            host_name: "srv0".to_string(),
            component_signature: component.to_string(),
            operation_signature: operation.to_string(),
        }
    }

    #[test]
    fn test_build_component_and_operation_levels() {
        let sources = shared(SourceModel::new());
        let types = TypeModelAssembler::new(
            shared(TypeModel::new()),
            sources.clone(),
            Arc::new(IdentitySignatureExtractor),
            "test",
        );
        let exec = ExecutionModelAssembler::new(shared(ExecutionModel::new()), sources, "test");

        let f = types.add_operation(&event("org.A", "f()")).unwrap().0;
        let h = types.add_operation(&event("org.A", "h()")).unwrap().0;
        let g = types.add_operation(&event("org.B", "g()")).unwrap().0;
        exec.add_operation_call(&f, &g, Some(10)).unwrap();
        exec.add_operation_call(&f, &g, Some(20)).unwrap();
        exec.add_operation_call(&f, &h, None).unwrap();
        // Callee only known from the execution model.
        exec.add_operation_call(&g, &OperationRef::new("org.C", "x()"), None).unwrap();

        let graph = ModelGraphBuilder::default().build(
            &types.model().read().unwrap(),
            &exec.model().read().unwrap(),
        );

        assert_eq!(graph.label(), "architecture");
        assert_eq!(graph.nodes().len(), 3);
        let a = graph.find_node("org.A").unwrap();
        assert_eq!(a.label, "A");
        assert_eq!(a.properties.get("package").map(String::as_str), Some("org"));
        let ops = a.child_graph().unwrap();
        assert_eq!(ops.label(), "org.A");
        assert_eq!(ops.nodes().len(), 2);
        assert_eq!(ops.edges().len(), 1);
        assert_eq!(ops.edges()[0].target(), "org.A.h()");

        let ab = graph.find_edge("org.A->org.B").unwrap();
        assert_eq!(ab.properties.get("count").map(String::as_str), Some("2"));
        assert!(graph.find_node("org.C").unwrap().has_child_graph());
        assert!(graph.find_edge("org.B->org.C").is_some());
        // Calls within a component also show up at the component level.
        assert!(graph.find_edge("org.A->org.A").is_some());
    }
}
