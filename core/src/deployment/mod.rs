//! Multi-service deployment from compose text.
//!
//! Every service is created independently and exactly once per call. Nothing
//! is rolled back and nothing is deduplicated across calls: deploying the same
//! file twice attempts every service twice. Starting the created containers
//! is a separate, best-effort step ([`DeploymentOrchestrator::start_all`]).

pub mod compose;

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::DeploymentResult;

pub use compose::{ComposeProject, ServiceSpec};

/// Ordered per-service outcomes of one deployment call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub results: Vec<DeploymentResult>,
}

impl Deployment {
    pub fn successes(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn is_partial(&self) -> bool {
        self.successes().next().is_some() && self.failures().next().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartAllReport {
    pub attempted: usize,
    /// Service names that started.
    pub started: Vec<String>,
    /// Service name and the start error.
    pub failed: Vec<(String, Error)>,
}

pub struct DeploymentOrchestrator {
    engine: Arc<dyn Engine>,
}

impl DeploymentOrchestrator {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Parse `text` and deploy it. Malformed input is rejected before any
    /// engine call.
    pub async fn deploy(&self, text: &str) -> Result<Deployment> {
        let project = ComposeProject::parse(text)?;
        Ok(self.deploy_project(&project).await)
    }

    pub async fn deploy_project(&self, project: &ComposeProject) -> Deployment {
        let mut results = Vec::with_capacity(project.services.len());

        for service in &project.services {
            let result = match &service.spec {
                Err(message) => DeploymentResult::failed(&service.name, message.clone()),
                Ok(spec) => match spec.validate() {
                    Err(e) => DeploymentResult::failed(&service.name, e.to_string()),
                    Ok(()) => match self.engine.create_container(spec).await {
                        Ok(id) => DeploymentResult::created(&service.name, id),
                        Err(e) => DeploymentResult::failed(&service.name, e.to_string()),
                    },
                },
            };

            match &result.error {
                None => info!("Service {} created", service.name),
                Some(e) => warn!("Service {} failed: {}", service.name, e),
            }
            results.push(result);
        }

        let deployment = Deployment { results };
        info!(
            "Deployment finished: {} created, {} failed",
            deployment.successes().count(),
            deployment.failures().count()
        );
        deployment
    }

    /// Start every container a successful result names. A failed start is
    /// recorded and the remaining services are still attempted.
    pub async fn start_all(&self, results: &[DeploymentResult]) -> StartAllReport {
        let mut report = StartAllReport::default();

        for result in results.iter().filter(|r| r.success) {
            let Some(id) = result.container_id.as_deref() else {
                continue;
            };
            report.attempted += 1;
            match self.engine.start_container(id).await {
                Ok(()) => report.started.push(result.service_name.clone()),
                Err(e) => {
                    error!("Failed to start {}: {}", result.service_name, e);
                    report.failed.push((result.service_name.clone(), e));
                }
            }
        }

        report
    }
}
