use std::sync::Arc;
use std::time::Duration;

use dock_core::templates::builtin_templates;
use dock_core::{
    Error, ProvisioningPhase, ProvisioningSession, ProvisioningSettings, ProvisioningWorkflow,
    Template,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::FakeEngine;

fn template() -> Template {
    builtin_templates()[0].clone()
}

fn workflow(engine: Arc<FakeEngine>) -> Arc<ProvisioningWorkflow> {
    Arc::new(ProvisioningWorkflow::new(
        engine,
        ProvisioningSettings {
            pull_confirmation: Duration::ZERO,
        },
    ))
}

fn phases(rx: &mut mpsc::UnboundedReceiver<ProvisioningSession>) -> Vec<ProvisioningPhase> {
    let mut seen = Vec::new();
    while let Ok(session) = rx.try_recv() {
        seen.push(session.phase);
    }
    seen
}

#[tokio::test]
async fn test_existing_image_skips_pull() {
    let t = template();
    let image = t.image.clone();
    let engine = FakeEngine::with(|s| s.images = vec![image]);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handoff = workflow(engine.clone())
        .run(t, &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        phases(&mut rx),
        vec![ProvisioningPhase::Checking, ProvisioningPhase::Creating]
    );
    assert_eq!(handoff.session.phase, ProvisioningPhase::Creating);
    assert!(handoff.error.is_none());
    assert_eq!(engine.count("pull_image"), 0);
}

#[tokio::test]
async fn test_missing_image_is_pulled_first() {
    let t = template();
    let engine = FakeEngine::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handoff = workflow(engine.clone())
        .run(t.clone(), &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        phases(&mut rx),
        vec![
            ProvisioningPhase::Checking,
            ProvisioningPhase::Pulling,
            ProvisioningPhase::Pulled,
            ProvisioningPhase::Creating,
        ]
    );
    assert!(handoff.error.is_none());
    assert_eq!(handoff.spec, t.to_create_spec());
    assert_eq!(engine.state().images, vec![t.image]);
}

#[tokio::test]
async fn test_failed_pull_still_offers_creation() {
    let engine = FakeEngine::with(|s| {
        s.pull_error = Some(Error::operation("pull image", "manifest unknown"));
    });
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handoff = workflow(engine)
        .run(template(), &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        phases(&mut rx),
        vec![
            ProvisioningPhase::Checking,
            ProvisioningPhase::Pulling,
            ProvisioningPhase::Failed,
            ProvisioningPhase::Creating,
        ]
    );
    assert!(matches!(handoff.error, Some(Error::Operation { .. })));
}

#[tokio::test]
async fn test_check_error_goes_straight_to_creation() {
    let engine = FakeEngine::with(|s| {
        s.image_check_error = Some(Error::operation("list images", "denied"));
    });
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handoff = workflow(engine.clone())
        .run(template(), &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        phases(&mut rx),
        vec![ProvisioningPhase::Checking, ProvisioningPhase::Creating]
    );
    assert!(handoff.error.is_some());
    assert!(handoff.session.message.contains("denied"));
    assert_eq!(engine.count("pull_image"), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_publishes_nothing() {
    let engine = FakeEngine::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let handoff = workflow(engine.clone()).run(template(), &tx, &cancel).await;

    assert!(handoff.is_none());
    assert!(phases(&mut rx).is_empty());
    assert_eq!(engine.count("image_exists"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_pull_confirmation() {
    let engine = FakeEngine::new();
    let workflow = Arc::new(ProvisioningWorkflow::new(
        engine.clone(),
        ProvisioningSettings::default(),
    ));
    let mut handle = workflow.spawn(template());

    loop {
        let session = handle.progress.recv().await.unwrap();
        if session.phase == ProvisioningPhase::Pulled {
            break;
        }
    }
    handle.cancel();

    assert!(handle.join().await.is_none());
    assert_eq!(engine.count("create_container"), 0);
}

#[tokio::test]
async fn test_finish_creates_and_starts() {
    let t = template();
    let image = t.image.clone();
    let engine = FakeEngine::with(|s| s.images = vec![image]);
    let (tx, _rx) = mpsc::unbounded_channel();
    let wf = workflow(engine.clone());

    let mut handoff = wf.run(t, &tx, &CancellationToken::new()).await.unwrap();
    let spec = handoff.spec.clone();
    let id = wf.finish(&mut handoff, &spec).await.unwrap();

    assert_eq!(handoff.session.phase, ProvisioningPhase::Done);
    assert_eq!(engine.state().started, vec![id]);
}

#[tokio::test]
async fn test_finish_failure_stays_in_creation() {
    let t = template();
    let image = t.image.clone();
    let engine = FakeEngine::with(|s| {
        s.images = vec![image.clone()];
        s.create_failures.insert(image);
    });
    let (tx, _rx) = mpsc::unbounded_channel();
    let wf = workflow(engine);

    let mut handoff = wf.run(t, &tx, &CancellationToken::new()).await.unwrap();
    let spec = handoff.spec.clone();
    let err = wf.finish(&mut handoff, &spec).await.unwrap_err();

    assert_eq!(handoff.session.phase, ProvisioningPhase::Creating);
    assert_eq!(handoff.session.message, err.to_string());
}

#[tokio::test]
async fn test_finish_rejects_invalid_form_without_engine_call() {
    let t = template();
    let image = t.image.clone();
    let engine = FakeEngine::with(|s| s.images = vec![image]);
    let (tx, _rx) = mpsc::unbounded_channel();
    let wf = workflow(engine.clone());

    let mut handoff = wf.run(t, &tx, &CancellationToken::new()).await.unwrap();
    let mut spec = handoff.spec.clone();
    spec.name = Some("not a valid name!".to_string());

    let err = wf.finish(&mut handoff, &spec).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(engine.count("create_container"), 0);
}
