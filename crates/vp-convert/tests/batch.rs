//! Batch controller: shared reference, bounded concurrency, failure isolation

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use vp_convert::{
    BatchController, BatchReport, BatchRequest, ConversionConfig, ConversionError, ConversionOrchestrator,
    FileValidationError, JobStatus, VpError,
};

fn controller(config: ConversionConfig, engine: &Arc<FakeEngine>, loader: &Arc<CountingLoader>) -> BatchController {
    let orchestrator = ConversionOrchestrator::new(config, engine.clone())
        .unwrap()
        .with_loader(loader.clone());
    BatchController::new(Arc::new(orchestrator))
}

fn inputs(dir: &std::path::Path, count: usize) -> Vec<PathBuf> {
    (0..count).map(|i| speech(dir, &format!("take_{}.wav", i))).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_failure_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let files = inputs(dir.path(), 5);
    let reference = speech(dir.path(), "reference.wav");

    let engine = shared(FakeEngine::failing_on("_file_3."));
    let loader = shared(CountingLoader::default());
    let controller = controller(test_config(dir.path()), &engine, &loader);

    let report = controller
        .run_batch(BatchRequest::new(files.clone(), &reference))
        .await
        .unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(report.completed, 4);
    assert_eq!(report.failed, 1);

    let failed: Vec<_> = report.results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].index, 3);
    assert!(failed[0].error.as_deref().unwrap_or_default().contains("scripted failure"));

    for result in report.results.iter().filter(|r| r.is_success()) {
        let expected = dir
            .path()
            .join("out")
            .join(BatchReport::output_file_name(&report.batch_id, result.index));
        assert_eq!(result.output_path.as_ref(), Some(&expected));
        assert!(expected.is_file());
    }

    // reference prepared once, inputs loaded once each
    assert_eq!(loader.loads_of(&reference), 1);
    for file in &files {
        assert_eq!(loader.loads_of(file), 1);
    }
    assert!(scratch_is_clean(dir.path()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_follow_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let files = inputs(dir.path(), 4);
    let reference = speech(dir.path(), "reference.wav");

    // first job finishes last
    let engine = shared(FakeEngine {
        slow_marker: Some(("_file_0.".to_string(), Duration::from_millis(300))),
        ..FakeEngine::copying()
    });
    let loader = shared(CountingLoader::default());
    let config = test_config(dir.path()).with_max_concurrent(4);
    let controller = controller(config, &engine, &loader);

    let report = controller
        .run_batch(BatchRequest::new(files.clone(), &reference))
        .await
        .unwrap();

    assert_eq!(report.completed, 4);
    for (i, result) in report.results.iter().enumerate() {
        assert_eq!(result.index, i);
        assert_eq!(result.input_name, format!("take_{}.wav", i));
        assert_eq!(result.status, JobStatus::Completed);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_bound_respected() {
    let dir = tempfile::tempdir().unwrap();
    let files = inputs(dir.path(), 6);
    let reference = speech(dir.path(), "reference.wav");

    let engine = shared(FakeEngine {
        delay: Duration::from_millis(100),
        ..FakeEngine::copying()
    });
    let loader = shared(CountingLoader::default());
    let mut config = test_config(dir.path());
    config.engine_workers = 8;
    let controller = controller(config, &engine, &loader);

    let report = controller
        .run_batch(BatchRequest::new(files, &reference).with_max_concurrent(2))
        .await
        .unwrap();

    assert_eq!(report.completed, 6);
    assert!((1..=2).contains(&engine.max_in_flight()), "{}", engine.max_in_flight());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_permit_serializes_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let files = inputs(dir.path(), 3);
    let reference = speech(dir.path(), "reference.wav");

    let engine = shared(FakeEngine {
        delay: Duration::from_millis(50),
        ..FakeEngine::copying()
    });
    let loader = shared(CountingLoader::default());
    let controller = controller(test_config(dir.path()), &engine, &loader);

    let report = controller
        .run_batch(BatchRequest::new(files, &reference).with_max_concurrent(1))
        .await
        .unwrap();

    assert_eq!(report.completed, 3);
    assert_eq!(engine.max_in_flight(), 1);
}

#[tokio::test]
async fn test_invalid_input_becomes_failed_entry() {
    let dir = tempfile::tempdir().unwrap();
    let mut files = inputs(dir.path(), 2);
    files.insert(1, dir.path().join("missing.wav"));
    let reference = speech(dir.path(), "reference.wav");

    let engine = shared(FakeEngine::copying());
    let loader = shared(CountingLoader::default());
    let controller = controller(test_config(dir.path()), &engine, &loader);

    let report = controller
        .run_batch(BatchRequest::new(files, &reference))
        .await
        .unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.results[1].status, JobStatus::Failed);
    assert!(report.results[1].error.as_deref().unwrap_or_default().contains("not found"));
}

#[tokio::test]
async fn test_batch_shape_validated() {
    let dir = tempfile::tempdir().unwrap();
    let reference = speech(dir.path(), "reference.wav");
    let engine = shared(FakeEngine::copying());
    let loader = shared(CountingLoader::default());

    let mut config = test_config(dir.path());
    config.max_batch_size = 2;
    let controller = controller(config, &engine, &loader);

    let err = controller
        .run_batch(BatchRequest::new(Vec::new(), &reference))
        .await
        .unwrap_err();
    assert!(matches!(err, VpError::Validation(FileValidationError::EmptyBatch)));

    let err = controller
        .run_batch(BatchRequest::new(inputs(dir.path(), 3), &reference))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VpError::Validation(FileValidationError::BatchTooLarge { count: 3, max: 2 })
    ));

    let err = controller
        .run_batch(BatchRequest::new(inputs(dir.path(), 1), &reference).with_max_concurrent(0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VpError::Validation(FileValidationError::InvalidConcurrency(0))
    ));
    assert_eq!(loader.loads_of(&reference), 0);
}

#[tokio::test]
async fn test_unavailable_engine_aborts_batch() {
    let dir = tempfile::tempdir().unwrap();
    let files = inputs(dir.path(), 2);
    let reference = speech(dir.path(), "reference.wav");

    let engine = shared(FakeEngine::unavailable());
    let loader = shared(CountingLoader::default());
    let controller = controller(test_config(dir.path()), &engine, &loader);

    let err = controller
        .run_batch(BatchRequest::new(files, &reference))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VpError::Conversion(ConversionError::EngineUnavailable(_))
    ));
    assert_eq!(loader.loads_of(&reference), 0);
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn test_unusable_reference_aborts_batch() {
    let dir = tempfile::tempdir().unwrap();
    let files = inputs(dir.path(), 2);
    let reference = write_wav(dir.path(), "reference.wav", tone(0.2));

    let engine = shared(FakeEngine::copying());
    let loader = shared(CountingLoader::default());
    let controller = controller(test_config(dir.path()), &engine, &loader);

    let err = controller
        .run_batch(BatchRequest::new(files, &reference))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VpError::Conversion(ConversionError::ReferenceTooShort { .. })
    ));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_report_serializes() {
    let dir = tempfile::tempdir().unwrap();
    let files = inputs(dir.path(), 1);
    let reference = speech(dir.path(), "reference.wav");

    let engine = shared(FakeEngine::copying());
    let loader = shared(CountingLoader::default());
    let controller = controller(test_config(dir.path()), &engine, &loader);

    let report = controller
        .run_batch(BatchRequest::new(files, &reference).with_output_dir(dir.path().join("custom")))
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["results"][0]["status"], "completed");
    assert!(report.results[0]
        .output_path
        .as_ref()
        .is_some_and(|p| p.starts_with(dir.path().join("custom"))));
}
