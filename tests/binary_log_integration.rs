//! Binary log round trip: monitoring writer → file → reader → pipeline

mod common;

use common::builders::ExecutionBuilder;
use common::{identity_extractor, memory_controller};
use std::io::Write;
use tracescope_rs::config::AnalysisConfig;
use tracescope_rs::model::{ModelSet, OperationRef};
use tracescope_rs::monitoring::{BinaryLogWriter, MonitoringWriter, OperationExecutionProbe};
use tracescope_rs::pipeline::stages::{BinaryLogReader, CollectorStage};
use tracescope_rs::pipeline::{Pipeline, PipelineBuilder, PipelineError};
use tracescope_rs::record::RecordEncoder;

#[test]
fn test_replay_binary_log_through_default_pipeline() {
    let (controller, memory) = memory_controller("srv0", 1);
    let probe = OperationExecutionProbe::new(&controller);
    probe.monitor("A", "f()", || probe.monitor("B", "g()", || ()));

    let file = tempfile::NamedTempFile::new().unwrap();
    let writer = BinaryLogWriter::new(file.reopen().unwrap());
    for record in memory.records() {
        writer.write_record(&record).unwrap();
    }
    writer.into_inner().unwrap().flush().unwrap();

    let models = ModelSet::new();
    let reader = BinaryLogReader::open(file.path(), true).unwrap();
    let (pipeline, _) = PipelineBuilder::new(AnalysisConfig::default())
        .build_default(Box::new(reader), &models, identity_extractor())
        .unwrap();
    pipeline.run().unwrap();

    let execution = models.execution.read().unwrap();
    assert_eq!(execution.invocation_count(), 1);
    assert!(execution
        .invocation(&OperationRef::new("A", "f()"), &OperationRef::new("B", "g()"))
        .is_some());
}

#[test]
fn test_truncated_log_keeps_complete_records() {
    let mut encoder = RecordEncoder::new(Vec::new());
    for eoi in 0..3 {
        encoder
            .write_record(&ExecutionBuilder::new("A", "f()").order(eoi, eoi).record())
            .unwrap();
    }
    let mut bytes = encoder.into_inner();
    bytes.truncate(bytes.len() - 4);

    let mut pipeline = Pipeline::new();
    let reader = pipeline
        .add_reader(BinaryLogReader::new(std::io::Cursor::new(bytes), true))
        .unwrap();
    let (collector, events) = CollectorStage::new();
    let sink = pipeline.add_stage(collector).unwrap();
    assert!(pipeline.connect(reader, "records", sink, "events"));

    // The reader stops at the damaged tail and reports it; records before
    // it have been delivered and the stages terminated.
    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::ReaderFailed(id, _) if id == reader));
    assert_eq!(events.len(), 2);
    assert!(events.is_terminated());
}

#[test]
fn test_truncated_log_fails_default_pipeline() {
    let (controller, memory) = memory_controller("srv0", 1);
    let probe = OperationExecutionProbe::new(&controller);
    probe.monitor("A", "f()", || probe.monitor("B", "g()", || ()));

    let mut encoder = RecordEncoder::new(Vec::new());
    for record in memory.records() {
        encoder.write_record(&record).unwrap();
    }
    let mut bytes = encoder.into_inner();
    bytes.truncate(bytes.len() - 3);

    let models = ModelSet::new();
    let reader = BinaryLogReader::new(std::io::Cursor::new(bytes), true);
    let (pipeline, ids) = PipelineBuilder::new(AnalysisConfig::default())
        .build_default(Box::new(reader), &models, identity_extractor())
        .unwrap();
    assert!(matches!(
        pipeline.run(),
        Err(PipelineError::ReaderFailed(id, _)) if id == ids.reader
    ));
}
