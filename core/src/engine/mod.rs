//! Typed request/response boundary to the container engine.
//!
//! Every other component talks to the engine only through [`Engine`]. No
//! operation retries or times out on its own; callers that need pacing own it.

pub mod docker;
pub mod registry;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{
    ContainerDetail, ContainerRecord, CreateContainerSpec, ImageInfo, NetworkInfo, SearchResult,
    StatsSample, VolumeInfo,
};

pub use docker::DockerEngine;
pub use registry::RegistryClient;

/// Default number of log lines fetched when the caller gives no bound.
pub const DEFAULT_LOG_TAIL: &str = "100";

#[async_trait]
pub trait Engine: Send + Sync {
    /// Probe the engine. An unreachable engine is `Error::Connectivity`.
    async fn check_connection(&self) -> Result<bool>;

    // Containers
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>>;
    async fn start_container(&self, id: &str) -> Result<()>;
    async fn stop_container(&self, id: &str) -> Result<()>;
    async fn restart_container(&self, id: &str) -> Result<()>;
    async fn pause_container(&self, id: &str) -> Result<()>;
    async fn unpause_container(&self, id: &str) -> Result<()>;
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;
    async fn container_logs(&self, id: &str, tail: Option<&str>) -> Result<String>;
    async fn container_details(&self, id: &str) -> Result<ContainerDetail>;
    async fn container_stats(&self, id: &str) -> Result<StatsSample>;
    async fn create_container(&self, spec: &CreateContainerSpec) -> Result<String>;

    /// Create a container and start it right away.
    async fn create_and_start_container(&self, spec: &CreateContainerSpec) -> Result<String> {
        let id = self.create_container(spec).await?;
        self.start_container(&id).await.map_err(|e| {
            Error::operation(
                "start container after creation",
                match e {
                    Error::Operation { message, .. } => message,
                    other => other.to_string(),
                },
            )
        })?;
        Ok(id)
    }

    // Images
    async fn list_images(&self) -> Result<Vec<ImageInfo>>;
    async fn remove_image(&self, id: &str, force: bool) -> Result<()>;
    async fn pull_image(&self, name: &str) -> Result<()>;
    async fn image_exists(&self, name: &str) -> Result<bool>;

    // Volumes
    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>>;
    async fn create_volume(&self, name: &str) -> Result<String>;
    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;

    // Networks
    async fn list_networks(&self) -> Result<Vec<NetworkInfo>>;
    async fn create_network(&self, name: &str, driver: Option<&str>) -> Result<String>;
    async fn remove_network(&self, id: &str) -> Result<()>;

    // Registry
    async fn search_registry(&self, query: &str, limit: Option<usize>)
        -> Result<Vec<SearchResult>>;
}

/// True when some local image carries exactly `name` as a repo tag.
pub fn image_tagged(images: &[ImageInfo], name: &str) -> bool {
    images
        .iter()
        .any(|img| img.repo_tags.iter().any(|tag| tag == name))
}

/// Split an image reference into repository and tag.
///
/// A colon belonging to a registry port (`host:5000/repo`) is not a tag
/// separator. Digests (`repo@sha256:...`) are returned whole with an empty tag.
pub fn split_image_reference(reference: &str) -> (String, String) {
    if reference.contains('@') {
        return (reference.to_string(), String::new());
    }
    let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[last_slash..].rfind(':') {
        Some(pos) => {
            let split = last_slash + pos;
            (
                reference[..split].to_string(),
                reference[split + 1..].to_string(),
            )
        }
        None => (reference.to_string(), "latest".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_reference() {
        assert_eq!(
            split_image_reference("nginx"),
            ("nginx".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_image_reference("postgres:16"),
            ("postgres".to_string(), "16".to_string())
        );
        assert_eq!(
            split_image_reference("localhost:5000/team/app"),
            ("localhost:5000/team/app".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_image_reference("localhost:5000/team/app:v2"),
            ("localhost:5000/team/app".to_string(), "v2".to_string())
        );
    }

    #[test]
    fn test_image_tagged() {
        let images = vec![ImageInfo {
            id: "sha256:1".into(),
            repo_tags: vec!["redis:latest".into(), "redis:7".into()],
            size: 10,
            created: 0,
        }];
        assert!(image_tagged(&images, "redis:7"));
        assert!(!image_tagged(&images, "redis"));
    }
}
