use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Container Types
// ============================================================================

/// Lifecycle state as reported by the engine.
///
/// The client never derives this; it only displays it and gates actions on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Exited,
    Dead,
    Restarting,
    Removing,
    Other(String),
}

impl ContainerState {
    pub fn as_str(&self) -> &str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
            ContainerState::Restarting => "restarting",
            ContainerState::Removing => "removing",
            ContainerState::Other(s) => s.as_str(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

impl From<&str> for ContainerState {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            _ => ContainerState::Other(value.to_string()),
        }
    }
}

impl From<String> for ContainerState {
    fn from(value: String) -> Self {
        ContainerState::from(value.as_str())
    }
}

impl From<ContainerState> for String {
    fn from(value: ContainerState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub ip: String,
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub port_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Human readable status line, e.g. "Up 5 minutes".
    pub status: String,
    pub ports: Vec<PortMapping>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    pub mount_type: String,
    pub source: String,
    pub destination: String,
    pub mode: String,
    pub rw: bool,
}

/// Single-container projection fetched when a detail view opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetail {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub status: String,
    pub created: String,
    pub ports: Vec<PortMapping>,
    pub mounts: Vec<MountInfo>,
    pub env: Vec<String>,
    /// Network name -> IP address.
    pub networks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSample {
    pub cpu_usage: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
}

// ============================================================================
// Image / Volume / Network Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub size: i64,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub internal: bool,
    pub ipam: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    pub description: String,
    pub star_count: i64,
    pub is_official: bool,
    pub is_automated: bool,
}

// ============================================================================
// Creation / Deployment Types
// ============================================================================

/// Everything the engine needs to create one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContainerSpec {
    pub image: String,
    pub name: Option<String>,
    /// "80/tcp" -> "8080"
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
    /// "volume:/data", "/host/path:/container/path:ro"
    #[serde(default)]
    pub volumes: Vec<String>,
    /// "KEY=value"
    #[serde(default)]
    pub env: Vec<String>,
    /// `None` means the default bridge network.
    pub network: Option<String>,
    /// `None` means no restart policy.
    pub restart_policy: Option<String>,
    pub command: Option<Vec<String>>,
    /// Bytes.
    pub memory_limit: Option<i64>,
    /// 100000 units = 1 core.
    pub cpu_quota: Option<i64>,
}

impl CreateContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }
}

/// Outcome of creating one compose service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub service_name: String,
    pub container_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl DeploymentResult {
    pub fn created(service_name: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            container_id: Some(container_id.into()),
            success: true,
            error: None,
        }
    }

    pub fn failed(service_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            container_id: None,
            success: false,
            error: Some(error.into()),
        }
    }
}
