//! Benchmarks for trace reconstruction and model assembly
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tracescope_rs::config::AnalysisConfig;
use tracescope_rs::model::{IdentitySignatureExtractor, ModelSet};
use tracescope_rs::pipeline::stages::MemoryReader;
use tracescope_rs::pipeline::PipelineBuilder;
use tracescope_rs::record::{MonitoringRecord, OperationExecutionRecord};
use tracescope_rs::trace::ExecutionTrace;

/// One trace: a root calling `width` components, each calling one helper.
fn trace_records(trace_id: i64, width: i32) -> Vec<OperationExecutionRecord> {
    let mut records = vec![execution(trace_id, "Root", "main()", 0, 0)];
    let mut eoi = 1;
    for i in 0..width {
        let component = format!("pkg.Service{}", i % 8);
        records.push(execution(trace_id, &component, "handle()", eoi, 1));
        records.push(execution(trace_id, &component, "helper()", eoi + 1, 2));
        eoi += 2;
    }
    // Exit order.
    records.reverse();
    records
}

fn execution(trace_id: i64, component: &str, operation: &str, eoi: i32, ess: i32) -> OperationExecutionRecord {
    OperationExecutionRecord {
        component_signature: component.to_string(),
        operation_signature: operation.to_string(),
        session_id: String::new(),
        trace_id,
        tin: eoi as i64,
        tout: 1_000 - eoi as i64,
        host_name: "bench".to_string(),
        eoi,
        ess,
    }
}

fn bench_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct");
    for width in [4, 32, 256] {
        let records = trace_records(1, width);
        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &records, |b, records| {
            b.iter(|| {
                let trace = ExecutionTrace::reconstruct(1, records.clone()).unwrap();
                black_box(trace.operation_calls())
            })
        });
    }
    group.finish();
}

fn bench_default_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("default_pipeline");
    group.sample_size(20);
    for traces in [10, 100] {
        let records: Vec<MonitoringRecord> = (0..traces)
            .flat_map(|t| trace_records(t, 16))
            .map(MonitoringRecord::from)
            .collect();
        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(traces), &records, |b, records| {
            b.iter(|| {
                let models = ModelSet::new();
                let (pipeline, _) = PipelineBuilder::new(AnalysisConfig::default())
                    .build_default(
                        Box::new(MemoryReader::new(records.clone())),
                        &models,
                        Arc::new(IdentitySignatureExtractor),
                    )
                    .unwrap();
                pipeline.run().unwrap();
                black_box(models)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reconstruct, bench_default_pipeline);
criterion_main!(benches);
