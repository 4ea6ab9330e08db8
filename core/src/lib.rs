//! Container-engine client core.
//!
//! Views read engine state only from [`ResourceCache`]. The cache is filled by
//! [`SyncScheduler`] ticks and by the refresh that follows every
//! [`ActionDispatcher`] call. Template provisioning and compose deployment
//! talk to the engine through the same [`Engine`] trait.

pub mod actions;
pub mod cache;
pub mod deployment;
pub mod engine;
pub mod error;
pub mod provisioning;
pub mod scheduler;
pub mod store;
pub mod templates;
pub mod types;
pub mod validation;
pub mod view;

pub use actions::{Action, ActionDispatcher, ActionOutcome};
pub use cache::{filter_log_lines, CachedSnapshot, ResourceCache, ResourceKind, Snapshot};
pub use deployment::{ComposeProject, Deployment, DeploymentOrchestrator, StartAllReport};
pub use engine::{DockerEngine, Engine, RegistryClient};
pub use error::{Error, Result};
pub use provisioning::{
    Handoff, ProvisioningHandle, ProvisioningPhase, ProvisioningSession, ProvisioningSettings,
    ProvisioningWorkflow,
};
pub use scheduler::{SchedulerSettings, SyncEvent, SyncScheduler, ViewId};
pub use templates::{Template, TemplateStore};
pub use types::*;
pub use view::{Overlays, View, ViewState};
