//! "Use template" flow: check the image, pull it when missing, then hand off
//! to container creation with a spec pre-populated from the template.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::templates::Template;
use crate::types::CreateContainerSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningPhase {
    Checking,
    Pulling,
    Pulled,
    Creating,
    Failed,
    Done,
}

/// Progress of one workflow run. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningSession {
    pub template: Template,
    pub phase: ProvisioningPhase,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    /// How long the "pulled" confirmation stays up before creation opens.
    pub pull_confirmation: Duration,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            pull_confirmation: Duration::from_secs(1),
        }
    }
}

/// Where the workflow stops: ready for the creation form.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub session: ProvisioningSession,
    pub spec: CreateContainerSpec,
    /// Error surfaced on the way (failed check or pull). Creation is still
    /// offered so the user can fix the image reference by hand.
    pub error: Option<Error>,
}

pub struct ProvisioningWorkflow {
    engine: Arc<dyn Engine>,
    settings: ProvisioningSettings,
}

/// A workflow running in the background.
pub struct ProvisioningHandle {
    cancel: CancellationToken,
    pub progress: mpsc::UnboundedReceiver<ProvisioningSession>,
    task: JoinHandle<Option<Handoff>>,
}

impl ProvisioningHandle {
    /// Dismiss the workflow. No further progress is published.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `None` when the workflow was cancelled before reaching the hand-off.
    pub async fn join(self) -> Option<Handoff> {
        self.task.await.ok().flatten()
    }
}

struct Reporter<'a> {
    session: ProvisioningSession,
    progress: &'a mpsc::UnboundedSender<ProvisioningSession>,
    cancel: &'a CancellationToken,
}

impl Reporter<'_> {
    /// Move to `phase`. Returns false once the workflow has been dismissed.
    fn transition(&mut self, phase: ProvisioningPhase, message: impl Into<String>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.session.phase = phase;
        self.session.message = message.into();
        info!(
            "Provisioning {}: {:?} {}",
            self.session.template.id, phase, self.session.message
        );
        let _ = self.progress.send(self.session.clone());
        true
    }
}

impl ProvisioningWorkflow {
    pub fn new(engine: Arc<dyn Engine>, settings: ProvisioningSettings) -> Self {
        Self { engine, settings }
    }

    pub fn spawn(self: &Arc<Self>, template: Template) -> ProvisioningHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let workflow = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { workflow.run(template, &tx, &token).await });
        ProvisioningHandle {
            cancel,
            progress: rx,
            task,
        }
    }

    /// Drive the workflow up to the creation hand-off.
    ///
    /// Every engine call and the confirmation delay race against `cancel`;
    /// once it fires nothing more is published and `None` is returned.
    pub async fn run(
        &self,
        template: Template,
        progress: &mpsc::UnboundedSender<ProvisioningSession>,
        cancel: &CancellationToken,
    ) -> Option<Handoff> {
        let image = template.image.clone();
        let spec = template.to_create_spec();
        let mut reporter = Reporter {
            session: ProvisioningSession {
                template,
                phase: ProvisioningPhase::Checking,
                message: String::new(),
            },
            progress,
            cancel,
        };

        if !reporter.transition(ProvisioningPhase::Checking, format!("Checking {}...", image)) {
            return None;
        }

        let exists = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = self.engine.image_exists(&image) => result,
        };

        let mut surfaced = None;
        match exists {
            Ok(true) => {}
            Ok(false) => {
                if !reporter.transition(ProvisioningPhase::Pulling, format!("Pulling {}...", image))
                {
                    return None;
                }

                let pulled = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    result = self.engine.pull_image(&image) => result,
                };

                match pulled {
                    Ok(()) => {
                        if !reporter.transition(
                            ProvisioningPhase::Pulled,
                            format!("Successfully pulled {}", image),
                        ) {
                            return None;
                        }
                        tokio::select! {
                            _ = cancel.cancelled() => return None,
                            _ = tokio::time::sleep(self.settings.pull_confirmation) => {}
                        }
                    }
                    Err(e) => {
                        warn!("Pull of {} failed, continuing to manual creation: {}", image, e);
                        if !reporter.transition(ProvisioningPhase::Failed, e.to_string()) {
                            return None;
                        }
                        surfaced = Some(e);
                    }
                }
            }
            Err(e) => {
                warn!("Could not check for {}, continuing to creation: {}", image, e);
                surfaced = Some(e);
            }
        }

        let message = match &surfaced {
            Some(e) => format!("Create container from {} ({})", image, e),
            None => format!("Create container from {}", image),
        };
        if !reporter.transition(ProvisioningPhase::Creating, message) {
            return None;
        }

        Some(Handoff {
            session: reporter.session,
            spec,
            error: surfaced,
        })
    }

    /// Complete the creation form: create and start from `spec`.
    ///
    /// On failure the session stays in `Creating` with the error as message.
    pub async fn finish(&self, handoff: &mut Handoff, spec: &CreateContainerSpec) -> Result<String> {
        let result = match spec.validate() {
            Ok(()) => self.engine.create_and_start_container(spec).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(id) => {
                info!("Template {} provisioned as container {}", handoff.session.template.id, id);
                handoff.session.phase = ProvisioningPhase::Done;
                handoff.session.message = format!("Created and started container {}", id);
                Ok(id)
            }
            Err(e) => {
                warn!("Creating container from template {} failed: {}", handoff.session.template.id, e);
                handoff.session.message = e.to_string();
                Err(e)
            }
        }
    }
}
