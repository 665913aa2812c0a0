//! End-to-end orchestrator workflows against a deterministic engine
//!
//! Covers the progress contract, the request state machine and isolation
//! between the two model variants.

mod common;

use common::{
    drain_progress, observed, orchestrator, split_png, BrightnessEngine, ScriptedFetcher,
    GENERAL_URL, PORTRAIT_URL,
};
use local_bgremove::{
    BackgroundColor, BgRemovalError, ExportFormat, ModelKind, ProcessingStatus, ProgressEvent,
    RemovalOptions,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_cold_request_reports_full_progress_sequence() {
    let fetcher = ScriptedFetcher::new().with_reports(vec![
        (250_000, 1_000_000),
        (500_000, 1_000_000),
        (1_000_000, 1_000_000),
    ]);
    let (orchestrator, mut events) = observed(orchestrator(BrightnessEngine::new(), fetcher));
    let options = RemovalOptions::new(ModelKind::General).with_soften_radius(2.0);

    let result = orchestrator.process(&split_png(100, 100), &options).await.unwrap();

    assert_eq!(
        drain_progress(&mut events),
        vec![7.5, 15.0, 30.0, 35.0, 40.0, 60.0, 80.0, 90.0, 100.0]
    );
    assert_eq!((result.width, result.height), (100, 100));
    assert_eq!(orchestrator.status(), ProcessingStatus::Completed);
    assert_eq!(orchestrator.progress(), 100.0);
}

#[tokio::test]
async fn test_progress_skips_softening_step_when_not_requested() {
    let fetcher = ScriptedFetcher::new().with_reports(vec![(1, 1)]);
    let (orchestrator, mut events) = observed(orchestrator(BrightnessEngine::new(), fetcher));

    // A zero radius disables softening
    let options = RemovalOptions::new(ModelKind::Portrait).with_soften_radius(0.0);
    orchestrator.process(&split_png(12, 8), &options).await.unwrap();

    assert_eq!(
        drain_progress(&mut events),
        vec![30.0, 35.0, 40.0, 60.0, 80.0, 100.0]
    );
}

#[tokio::test]
async fn test_unknown_download_size_is_capped() {
    let fetcher = ScriptedFetcher::new().with_reports(vec![(8192, 0); 40]);
    let (orchestrator, mut events) = observed(orchestrator(BrightnessEngine::new(), fetcher));

    orchestrator
        .process(&split_png(8, 8), &RemovalOptions::new(ModelKind::General))
        .await
        .unwrap();

    let progress = drain_progress(&mut events);
    let loading: Vec<f32> = progress.iter().copied().filter(|p| *p < 35.0).collect();
    assert_eq!(loading.len(), 25);
    assert!(loading.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(loading.last().copied(), Some(25.0));
    assert_eq!(&progress[loading.len()..], &[35.0, 40.0, 60.0, 80.0, 100.0]);
}

#[tokio::test]
async fn test_progress_never_decreases() {
    // Out-of-order reports must not pull progress back
    let fetcher = ScriptedFetcher::new().with_reports(vec![
        (600, 1000),
        (300, 1000),
        (1000, 1000),
    ]);
    let (orchestrator, mut events) = observed(orchestrator(BrightnessEngine::new(), fetcher));

    orchestrator
        .process(&split_png(8, 8), &RemovalOptions::new(ModelKind::General))
        .await
        .unwrap();

    let progress = drain_progress(&mut events);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.first().copied(), Some(18.0));
}

#[tokio::test]
async fn test_decode_failure_freezes_progress_at_forty() {
    let (orchestrator, mut events) =
        observed(orchestrator(BrightnessEngine::new(), ScriptedFetcher::new()));

    let result = orchestrator
        .process(b"definitely not an image", &RemovalOptions::new(ModelKind::General))
        .await;

    assert!(matches!(result, Err(BgRemovalError::Decode(_))));
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, ProcessingStatus::Error);
    assert_eq!(snapshot.progress, 40.0);
    assert!(snapshot.error.is_some());
    assert!(orchestrator.result().is_none());

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        if let ProgressEvent::Failed { .. } = event {
            failed = true;
        }
    }
    assert!(failed);
}

#[tokio::test]
async fn test_export_failure_never_completes() {
    let (orchestrator, mut events) =
        observed(orchestrator(BrightnessEngine::new(), ScriptedFetcher::new()));
    // Decodes as PNG but is too wide for WebP
    let options = RemovalOptions::new(ModelKind::General)
        .with_format(ExportFormat::WebP)
        .with_quality(0.8);

    let result = orchestrator.process(&split_png(17_000, 1), &options).await;

    assert!(matches!(result, Err(BgRemovalError::Encode(_))));
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, ProcessingStatus::Error);
    assert_eq!(snapshot.progress, 80.0);
    assert!(orchestrator.result().is_none());

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ProgressEvent::Failed { .. } => failed = true,
            ProgressEvent::Completed(_) => panic!("export failure reported completion"),
            _ => {},
        }
    }
    assert!(failed);
}

#[tokio::test]
async fn test_error_state_requires_reset() {
    let orchestrator = orchestrator(BrightnessEngine::failing_run(), ScriptedFetcher::new());
    let options = RemovalOptions::new(ModelKind::Portrait);

    assert!(orchestrator.process(&split_png(8, 8), &options).await.is_err());
    assert_eq!(orchestrator.status(), ProcessingStatus::Error);

    let retry = orchestrator.process(&split_png(8, 8), &options).await;
    assert!(matches!(retry, Err(BgRemovalError::Busy(_))));
    assert_eq!(orchestrator.status(), ProcessingStatus::Error);

    orchestrator.reset();
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, ProcessingStatus::Idle);
    assert_eq!(snapshot.progress, 0.0);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_reset_supersedes_in_flight_request() {
    let (fetcher, gate) = ScriptedFetcher::new().gated();
    let orchestrator = Arc::new(orchestrator(BrightnessEngine::new(), fetcher));

    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .process(&split_png(8, 8), &RemovalOptions::new(ModelKind::General))
                .await
        })
    };

    while orchestrator.status() != ProcessingStatus::Loading {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let before = orchestrator.snapshot().generation;
    orchestrator.reset();
    gate.notify_one();

    let outcome = task.await.unwrap();
    assert!(matches!(outcome, Err(BgRemovalError::Superseded)));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.generation, before + 1);
    assert_eq!(snapshot.status, ProcessingStatus::Idle);
    assert_eq!(snapshot.progress, 0.0);
    assert!(orchestrator.result().is_none());

    // The finished initialization is kept for the next request
    assert!(orchestrator.registry().is_initialized(ModelKind::General).await);
}

#[tokio::test]
async fn test_variants_initialize_independently() {
    let engine = BrightnessEngine::new();
    let fetcher = ScriptedFetcher::new();
    let orchestrator = orchestrator(engine.clone(), fetcher.clone());

    orchestrator
        .process(&split_png(8, 8), &RemovalOptions::new(ModelKind::Portrait))
        .await
        .unwrap();
    assert!(orchestrator.registry().is_initialized(ModelKind::Portrait).await);
    assert!(!orchestrator.registry().is_initialized(ModelKind::General).await);

    orchestrator.reset();
    orchestrator
        .process(&split_png(8, 8), &RemovalOptions::new(ModelKind::General))
        .await
        .unwrap();

    assert_eq!(engine.load_count(), 2);
    assert_eq!(fetcher.fetched(), vec![PORTRAIT_URL.to_string(), GENERAL_URL.to_string()]);
}

#[tokio::test]
async fn test_failed_variant_does_not_affect_the_other() {
    let fetcher = ScriptedFetcher::new().failing_for(PORTRAIT_URL);
    let orchestrator = orchestrator(BrightnessEngine::new(), fetcher);

    let portrait = orchestrator
        .process(&split_png(8, 8), &RemovalOptions::new(ModelKind::Portrait))
        .await;
    assert!(portrait.unwrap_err().is_init_error());
    assert_eq!(orchestrator.progress(), 0.0);

    orchestrator.reset();
    let general = orchestrator
        .process(&split_png(8, 8), &RemovalOptions::new(ModelKind::General))
        .await;
    assert!(general.is_ok());
    assert!(!orchestrator.registry().is_initialized(ModelKind::Portrait).await);
}

#[tokio::test]
async fn test_model_is_fetched_once_across_requests() {
    let engine = BrightnessEngine::new();
    let fetcher = ScriptedFetcher::new();
    let orchestrator = orchestrator(engine.clone(), fetcher.clone());
    let options = RemovalOptions::new(ModelKind::General);

    for _ in 0..3 {
        orchestrator.process(&split_png(8, 8), &options).await.unwrap();
        orchestrator.reset();
    }

    assert_eq!(engine.load_count(), 1);
    assert_eq!(fetcher.fetched().len(), 1);
}

#[tokio::test]
async fn test_background_color_composites_opaque_result() {
    let orchestrator = orchestrator(BrightnessEngine::new(), ScriptedFetcher::new());
    let options =
        RemovalOptions::new(ModelKind::General).with_background(BackgroundColor::new(0, 0, 255));

    let result = orchestrator.process(&split_png(40, 20), &options).await.unwrap();

    assert!(result.processed.is_opaque());
    assert_eq!(result.processed.pixel(39, 10), Some([0, 0, 255, 255]));
    assert_eq!(result.processed.pixel(0, 10), Some([255, 255, 255, 255]));
}
