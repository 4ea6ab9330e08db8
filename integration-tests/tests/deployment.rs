use dock_core::{DeploymentOrchestrator, DeploymentResult, Error};

use crate::common::FakeEngine;

const STACK: &str = r#"
version: "3.8"
services:
  web:
    image: nginx:alpine
    container_name: stack-web
    ports:
      - "8080:80"
  worker:
    command: ["sleep", "infinity"]
  db:
    image: postgres:16
    environment:
      POSTGRES_PASSWORD: secret
  cache:
    image: redis:7
"#;

#[tokio::test]
async fn test_partial_deployment_reports_every_service() {
    let engine = FakeEngine::with(|s| {
        s.create_failures.insert("postgres:16".to_string());
    });
    let orchestrator = DeploymentOrchestrator::new(engine.clone());

    let deployment = orchestrator.deploy(STACK).await.unwrap();

    let names: Vec<&str> = deployment
        .results
        .iter()
        .map(|r| r.service_name.as_str())
        .collect();
    assert_eq!(names, vec!["web", "worker", "db", "cache"]);
    assert_eq!(deployment.successes().count(), 2);
    assert_eq!(deployment.failures().count(), 2);
    assert!(deployment.is_partial());

    assert_eq!(
        deployment.results[1].error.as_deref(),
        Some("No image specified")
    );
    assert!(deployment.results[2].error.is_some());

    // One container per success, none for the missing image.
    let created = engine.state().created.clone();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].name.as_deref(), Some("stack-web"));
    assert_eq!(created[0].ports.get("80/tcp").map(String::as_str), Some("8080"));
    assert_eq!(engine.count("create_container"), 3);
    assert_eq!(engine.count("start_container"), 0);
}

#[tokio::test]
async fn test_malformed_document_makes_no_engine_call() {
    let engine = FakeEngine::new();
    let orchestrator = DeploymentOrchestrator::new(engine.clone());

    for text in ["", "services: [unclosed", "version: '3'\n"] {
        let err = orchestrator.deploy(text).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{:?}", text);
    }
    assert!(engine.state().calls.is_empty());
}

#[tokio::test]
async fn test_redeploy_creates_again() {
    let engine = FakeEngine::new();
    let orchestrator = DeploymentOrchestrator::new(engine.clone());

    orchestrator.deploy(STACK).await.unwrap();
    orchestrator.deploy(STACK).await.unwrap();
    assert_eq!(engine.state().created.len(), 6);
}

#[tokio::test]
async fn test_start_all_continues_past_failures() {
    let engine = FakeEngine::with(|s| {
        s.start_failures.insert("c2".to_string());
    });
    let orchestrator = DeploymentOrchestrator::new(engine.clone());

    let results = vec![
        DeploymentResult::created("web", "c1"),
        DeploymentResult::created("db", "c2"),
        DeploymentResult::failed("worker", "No image specified"),
        DeploymentResult::created("cache", "c3"),
    ];
    let report = orchestrator.start_all(&results).await;

    assert_eq!(report.attempted, 3);
    assert_eq!(report.started, vec!["web".to_string(), "cache".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "db");
    assert_eq!(engine.count("start_container"), 3);
    assert_eq!(engine.state().started, vec!["c1".to_string(), "c3".to_string()]);
}
