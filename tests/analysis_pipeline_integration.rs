//! End-to-end: probes → writer → reader → default pipeline → models

mod common;

use common::builders::ExecutionBuilder;
use common::{identity_extractor, memory_controller};
use tracescope_rs::config::{AnalysisConfig, MonitoringConfig};
use tracescope_rs::graph::ModelGraphBuilder;
use tracescope_rs::model::{ModelEntity, ModelSet, OperationRef};
use tracescope_rs::monitoring::{MonitoringController, OperationExecutionProbe};
use tracescope_rs::pipeline::stages::MemoryReader;
use tracescope_rs::pipeline::PipelineBuilder;
use tracescope_rs::record::MonitoringRecord;

fn analyze(records: Vec<MonitoringRecord>, config: AnalysisConfig) -> ModelSet {
    let models = ModelSet::new();
    let (pipeline, _) = PipelineBuilder::new(config)
        .build_default(
            Box::new(MemoryReader::new(records)),
            &models,
            identity_extractor(),
        )
        .unwrap();
    pipeline.run().unwrap();
    models
}

#[test]
fn test_single_call_yields_one_invocation() {
    let (controller, writer) = memory_controller("srv0", 1);
    let probe = OperationExecutionProbe::new(&controller);
    probe.monitor("A", "f()", || probe.monitor("B", "g()", || ()));

    let models = analyze(writer.records(), AnalysisConfig::default());

    let types = models.types.read().unwrap();
    assert_eq!(types.component_count(), 2);
    assert!(types.operation(&OperationRef::new("A", "f()")).is_some());
    assert!(types.operation(&OperationRef::new("B", "g()")).is_some());

    let execution = models.execution.read().unwrap();
    assert_eq!(execution.invocation_count(), 1);
    let invocation = execution
        .invocation(&OperationRef::new("A", "f()"), &OperationRef::new("B", "g()"))
        .unwrap();
    assert_eq!(invocation.statistics.count, 1);
}

#[test]
fn test_repeated_traces_aggregate() {
    let (controller, writer) = memory_controller("srv0", 100);
    let probe = OperationExecutionProbe::new(&controller);
    for _ in 0..3 {
        probe.monitor("A", "f()", || {
            probe.monitor("B", "g()", || ());
            probe.monitor("B", "g()", || ());
        });
    }

    let models = analyze(writer.records(), AnalysisConfig::default());
    let execution = models.execution.read().unwrap();
    assert_eq!(execution.invocation_count(), 1);
    let invocation = execution.invocations().next().unwrap();
    assert_eq!(invocation.statistics.count, 6);
}

#[test]
fn test_remote_call_joins_caller_trace() {
    let (client, writer) = memory_controller("client", 1);
    let server_config = MonitoringConfig {
        host_name: "server".to_string(),
        ..MonitoringConfig::default()
    };
    let server = MonitoringController::new(&server_config, Box::new(writer.clone()));

    let probe = OperationExecutionProbe::new(&client);
    probe.monitor("A", "f()", || {
        let header = probe.outgoing_header();
        let response = std::thread::scope(|s| {
            s.spawn(|| {
                let remote = OperationExecutionProbe::new(&server);
                remote
                    .monitor_incoming(header.as_ref(), "R", "serve()", || ())
                    .1
            })
            .join()
            .unwrap()
        });
        if let Some(response) = response {
            probe.apply_response(&response);
        }
        probe.monitor("B", "g()", || ());
    });

    let records = writer.records();
    assert_eq!(records.len(), 3);
    let models = analyze(records, AnalysisConfig::default());
    let execution = models.execution.read().unwrap();
    let callees: Vec<String> = execution
        .callees_of(&OperationRef::new("A", "f()"))
        .map(|i| i.callee.to_string())
        .collect();
    assert_eq!(callees, vec!["B.g()".to_string(), "R.serve()".to_string()]);
}

#[test]
fn test_filter_window_drops_late_traces() {
    let records = vec![
        ExecutionBuilder::new("B", "g()").trace(1).order(1, 1).time(2, 3).record(),
        ExecutionBuilder::new("A", "f()").trace(1).order(0, 0).time(1, 4).record(),
        ExecutionBuilder::new("C", "h()").trace(2).order(1, 1).time(20, 30).record(),
        ExecutionBuilder::new("D", "k()").trace(2).order(0, 0).time(10, 40).record(),
    ];
    let mut config = AnalysisConfig::default();
    config.filter.not_after = Some(10);

    let models = analyze(records, config);
    let types = models.types.read().unwrap();
    assert_eq!(types.component_count(), 2);
    assert!(types.component("D").is_none());
    assert_eq!(models.execution.read().unwrap().invocation_count(), 1);
}

#[test]
fn test_snapshot_and_graph() {
    let records = vec![
        ExecutionBuilder::new("shop.Cart", "add()").order(0, 0).record(),
        ExecutionBuilder::new("shop.Stock", "reserve()").order(1, 1).record(),
        ExecutionBuilder::new("shop.Cart", "total()").order(2, 1).record(),
    ];
    let mut config = AnalysisConfig::default();
    config.source_label = "replay".to_string();
    let models = analyze(records, config);

    let snapshot = models.snapshot().unwrap();
    assert_eq!(snapshot.components.len(), 2);
    assert_eq!(snapshot.invocations.len(), 2);
    assert!(snapshot.sources.iter().any(|entry| matches!(
        &entry.entity,
        ModelEntity::Component { signature } if signature == "shop.Cart"
    ) && entry.provenance.sources.contains("replay")));
    assert!(snapshot.to_json_pretty().unwrap().contains("\"shop.Stock\""));

    let graph = ModelGraphBuilder::default().build(
        &models.types.read().unwrap(),
        &models.execution.read().unwrap(),
    );
    assert_eq!(graph.nodes().len(), 2);
    let cart = graph.find_node("shop.Cart").unwrap();
    let operations = cart.child_graph().unwrap();
    assert_eq!(operations.nodes().len(), 2);
    // add() → total() also shows up inside the Cart graph.
    assert_eq!(operations.edges().len(), 1);
    assert_eq!(graph.edges().len(), 2);
    let edge = graph.find_edge("shop.Cart->shop.Stock").unwrap();
    assert_eq!(edge.properties.get("count").map(String::as_str), Some("1"));
}
