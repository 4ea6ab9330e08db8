use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, RestartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{
    ContainerSummary, HostConfig, Mount, MountTypeEnum, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions, RemoveVolumeOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::{image_tagged, split_image_reference, Engine, RegistryClient, DEFAULT_LOG_TAIL};
use crate::error::{Error, Result};
use crate::types::{
    ContainerDetail, ContainerRecord, ContainerState, CreateContainerSpec, ImageInfo, MountInfo,
    NetworkInfo, PortMapping, SearchResult, StatsSample, VolumeInfo,
};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Engine implementation backed by the Docker API.
pub struct DockerEngine {
    docker: Docker,
    registry: RegistryClient,
}

impl DockerEngine {
    /// Connect using `host` (`unix://`, `tcp://`, `http://` or a socket path),
    /// or the platform defaults when `host` is `None`.
    pub fn connect(host: Option<&str>, registry: RegistryClient) -> Result<Self> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(h) if h.starts_with("tcp://") || h.starts_with("http://") => {
                Docker::connect_with_http(h, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(h) => Docker::connect_with_socket(
                h.trim_start_matches("unix://"),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            ),
        }
        .map_err(|e| Error::Connectivity(e.to_string()))?;

        info!("Docker engine client created (host={})", host.unwrap_or("local defaults"));
        Ok(Self { docker, registry })
    }

    pub fn from_docker(docker: Docker, registry: RegistryClient) -> Self {
        Self { docker, registry }
    }
}

/// Transport failures mean the engine is gone; anything else is one failed call.
fn is_unreachable(e: &bollard::errors::Error) -> bool {
    use bollard::errors::Error as DockerError;
    match e {
        DockerError::IOError { .. }
        | DockerError::SocketNotFoundError { .. }
        | DockerError::RequestTimeoutError { .. } => true,
        DockerError::HyperLegacyError { err } => err.is_connect(),
        _ => false,
    }
}

fn op_err(op: &'static str) -> impl FnOnce(bollard::errors::Error) -> Error {
    move |e| {
        if is_unreachable(&e) {
            Error::Connectivity(e.to_string())
        } else {
            Error::operation(op, e.to_string())
        }
    }
}

fn convert_summary(container: ContainerSummary) -> ContainerRecord {
    let ports = container
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| PortMapping {
            ip: p.ip.unwrap_or_default(),
            private_port: p.private_port,
            public_port: p.public_port,
            port_type: p.typ.map(|t| t.to_string()).unwrap_or_default(),
        })
        .collect();

    let name = container
        .names
        .unwrap_or_default()
        .first()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();

    ContainerRecord {
        id: container.id.unwrap_or_default(),
        name,
        image: container.image.unwrap_or_default(),
        state: ContainerState::from(container.state.unwrap_or_default()),
        status: container.status.unwrap_or_default(),
        ports,
        created: container.created.unwrap_or(0),
    }
}

fn restart_policy_name(policy: &str) -> RestartPolicyNameEnum {
    match policy {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        "no" | "" => RestartPolicyNameEnum::NO,
        _ => RestartPolicyNameEnum::EMPTY,
    }
}

/// Translate a creation spec into the engine's container config.
fn container_config(spec: &CreateContainerSpec) -> Config<String> {
    let mut port_bindings = HashMap::new();
    let mut exposed_ports = HashMap::new();
    for (container_port, host_port) in &spec.ports {
        exposed_ports.insert(container_port.clone(), HashMap::new());
        port_bindings.insert(
            container_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(host_port.clone()),
            }]),
        );
    }

    let mut binds = Vec::new();
    let mut mounts = Vec::new();
    for volume in &spec.volumes {
        let parts: Vec<&str> = volume.split(':').collect();
        if parts.len() < 2 {
            continue;
        }
        let (source, target) = (parts[0], parts[1]);
        let mode = parts.get(2).copied().unwrap_or("rw");

        if source.starts_with('/') || source.starts_with('.') {
            binds.push(format!("{}:{}:{}", source, target, mode));
        } else {
            mounts.push(Mount {
                target: Some(target.to_string()),
                source: Some(source.to_string()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(mode == "ro"),
                ..Default::default()
            });
        }
    }

    let host_config = HostConfig {
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        binds: (!binds.is_empty()).then_some(binds),
        mounts: (!mounts.is_empty()).then_some(mounts),
        memory: spec.memory_limit,
        cpu_quota: spec.cpu_quota,
        network_mode: spec.network.clone(),
        restart_policy: spec.restart_policy.as_deref().map(|p| RestartPolicy {
            name: Some(restart_policy_name(p)),
            ..Default::default()
        }),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(host_config),
        cmd: spec.command.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn check_connection(&self) -> Result<bool> {
        debug!("Pinging Docker engine");
        self.docker
            .ping()
            .await
            .map(|_| true)
            .map_err(|e| Error::Connectivity(e.to_string()))
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>> {
        debug!("list_containers(all={})", all);
        let options = Some(ListContainersOptions::<String> {
            all,
            ..Default::default()
        });
        let containers = self
            .docker
            .list_containers(options)
            .await
            .map_err(op_err("list containers"))?;
        Ok(containers.into_iter().map(convert_summary).collect())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        debug!("start_container({})", id);
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(op_err("start container"))
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        debug!("stop_container({})", id);
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(op_err("stop container"))
    }

    async fn restart_container(&self, id: &str) -> Result<()> {
        debug!("restart_container({})", id);
        self.docker
            .restart_container(id, None::<RestartContainerOptions>)
            .await
            .map_err(op_err("restart container"))
    }

    async fn pause_container(&self, id: &str) -> Result<()> {
        debug!("pause_container({})", id);
        self.docker
            .pause_container(id)
            .await
            .map_err(op_err("pause container"))
    }

    async fn unpause_container(&self, id: &str) -> Result<()> {
        debug!("unpause_container({})", id);
        self.docker
            .unpause_container(id)
            .await
            .map_err(op_err("unpause container"))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        debug!("remove_container({}, force={})", id, force);
        let options = Some(RemoveContainerOptions {
            force,
            ..Default::default()
        });
        self.docker
            .remove_container(id, options)
            .await
            .map_err(op_err("remove container"))
    }

    async fn container_logs(&self, id: &str, tail: Option<&str>) -> Result<String> {
        debug!("container_logs({}, tail={:?})", id, tail);
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.unwrap_or(DEFAULT_LOG_TAIL).to_string(),
            ..Default::default()
        });

        let mut stream = self.docker.logs(id, options);
        let mut logs = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(op_err("read container logs"))?;
            logs.push_str(&chunk.to_string());
        }
        Ok(logs)
    }

    async fn container_details(&self, id: &str) -> Result<ContainerDetail> {
        debug!("container_details({})", id);
        let container = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(op_err("inspect container"))?;

        let name = container
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();
        let config = container.config.unwrap_or_default();
        let state = container.state.unwrap_or_default();
        let network_settings = container.network_settings.unwrap_or_default();

        let ports = container
            .host_config
            .and_then(|hc| hc.port_bindings)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(port, bindings)| {
                let (private, proto) = match port.split_once('/') {
                    Some((p, proto)) => (p.to_string(), proto.to_string()),
                    None => (port.clone(), "tcp".to_string()),
                };
                bindings.unwrap_or_default().into_iter().map(move |binding| PortMapping {
                    ip: binding.host_ip.unwrap_or_default(),
                    private_port: private.parse().unwrap_or(0),
                    public_port: binding.host_port.and_then(|p| p.parse().ok()),
                    port_type: proto.clone(),
                })
            })
            .collect();

        let mounts = container
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountInfo {
                mount_type: m.typ.map(|t| t.to_string()).unwrap_or_default(),
                source: m.source.unwrap_or_default(),
                destination: m.destination.unwrap_or_default(),
                mode: m.mode.unwrap_or_default(),
                rw: m.rw.unwrap_or(false),
            })
            .collect();

        let networks: BTreeMap<String, String> = network_settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, endpoint)| (name, endpoint.ip_address.unwrap_or_default()))
            .collect();

        let status_text = match (state.running, state.exit_code) {
            (Some(true), _) => "running".to_string(),
            (_, Some(code)) => format!("exit code {}", code),
            _ => String::new(),
        };

        Ok(ContainerDetail {
            id: container.id.unwrap_or_default(),
            name,
            image: config.image.unwrap_or_default(),
            state: ContainerState::from(
                state.status.map(|s| s.to_string()).unwrap_or_default(),
            ),
            status: status_text,
            created: container.created.unwrap_or_default(),
            ports,
            mounts,
            env: config.env.unwrap_or_default(),
            networks,
        })
    }

    async fn container_stats(&self, id: &str) -> Result<StatsSample> {
        debug!("container_stats({})", id);
        let options = Some(StatsOptions {
            stream: false,
            one_shot: true,
        });
        let mut stream = self.docker.stats(id, options);
        let stats = match stream.next().await {
            Some(result) => result.map_err(op_err("read container stats"))?,
            None => return Err(Error::operation("read container stats", "no sample returned")),
        };

        let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
            - stats.precpu_stats.cpu_usage.total_usage as f64;
        let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
            - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or(1) as f64;
        let cpu_usage = if system_delta > 0.0 && cpu_delta > 0.0 {
            (cpu_delta / system_delta) * online_cpus * 100.0
        } else {
            0.0
        };

        let memory_usage = stats.memory_stats.usage.unwrap_or(0);
        let memory_limit = stats.memory_stats.limit.unwrap_or(1).max(1);
        let memory_percent = memory_usage as f64 / memory_limit as f64 * 100.0;

        let (network_rx, network_tx) = stats
            .networks
            .unwrap_or_default()
            .values()
            .fold((0u64, 0u64), |(rx, tx), n| (rx + n.rx_bytes, tx + n.tx_bytes));

        Ok(StatsSample {
            cpu_usage,
            memory_usage,
            memory_limit,
            memory_percent,
            network_rx,
            network_tx,
        })
    }

    async fn create_container(&self, spec: &CreateContainerSpec) -> Result<String> {
        info!("Creating container: image={}, name={:?}", spec.image, spec.name);
        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });
        let created = self
            .docker
            .create_container(options, container_config(spec))
            .await
            .map_err(op_err("create container"))?;
        Ok(created.id)
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        debug!("list_images()");
        let options = Some(ListImagesOptions::<String> {
            all: true,
            ..Default::default()
        });
        let images = self
            .docker
            .list_images(options)
            .await
            .map_err(op_err("list images"))?;
        Ok(images
            .into_iter()
            .map(|img| ImageInfo {
                id: img.id,
                repo_tags: img.repo_tags,
                size: img.size,
                created: img.created,
            })
            .collect())
    }

    async fn remove_image(&self, id: &str, force: bool) -> Result<()> {
        debug!("remove_image({}, force={})", id, force);
        let options = Some(RemoveImageOptions {
            force,
            ..Default::default()
        });
        self.docker
            .remove_image(id, options, None)
            .await
            .map(|_| ())
            .map_err(op_err("remove image"))
    }

    async fn pull_image(&self, name: &str) -> Result<()> {
        info!("Pulling image {}", name);
        let (repo, tag) = split_image_reference(name);
        let options = Some(CreateImageOptions::<String> {
            from_image: repo,
            tag,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress.map_err(op_err("pull image"))?;
            if let Some(status) = progress.status {
                debug!("pull {}: {}", name, status);
            }
        }
        Ok(())
    }

    async fn image_exists(&self, name: &str) -> Result<bool> {
        let images = self.list_images().await?;
        Ok(image_tagged(&images, name))
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        debug!("list_volumes()");
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions<String>>)
            .await
            .map_err(op_err("list volumes"))?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeInfo {
                name: v.name,
                driver: v.driver,
                mountpoint: v.mountpoint,
                created_at: v.created_at.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_volume(&self, name: &str) -> Result<String> {
        info!("Creating volume {}", name);
        let options = CreateVolumeOptions::<String> {
            name: name.to_string(),
            ..Default::default()
        };
        let volume = self
            .docker
            .create_volume(options)
            .await
            .map_err(op_err("create volume"))?;
        Ok(volume.name)
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        debug!("remove_volume({}, force={})", name, force);
        let options = force.then_some(RemoveVolumeOptions { force: true });
        self.docker
            .remove_volume(name, options)
            .await
            .map_err(op_err("remove volume"))
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>> {
        debug!("list_networks()");
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(op_err("list networks"))?;

        Ok(networks
            .into_iter()
            .map(|n| {
                let mut ipam = BTreeMap::new();
                if let Some(first) = n
                    .ipam
                    .and_then(|i| i.config)
                    .and_then(|configs| configs.into_iter().next())
                {
                    if let Some(subnet) = first.subnet {
                        ipam.insert("subnet".to_string(), subnet);
                    }
                    if let Some(gateway) = first.gateway {
                        ipam.insert("gateway".to_string(), gateway);
                    }
                }
                NetworkInfo {
                    id: n.id.unwrap_or_default(),
                    name: n.name.unwrap_or_default(),
                    driver: n.driver.unwrap_or_default(),
                    scope: n.scope.unwrap_or_default(),
                    internal: n.internal.unwrap_or(false),
                    ipam,
                }
            })
            .collect())
    }

    async fn create_network(&self, name: &str, driver: Option<&str>) -> Result<String> {
        info!("Creating network {} (driver={:?})", name, driver);
        let options = CreateNetworkOptions::<String> {
            name: name.to_string(),
            driver: driver.unwrap_or("bridge").to_string(),
            ..Default::default()
        };
        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(op_err("create network"))?;
        Ok(response.id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        debug!("remove_network({})", id);
        self.docker
            .remove_network(id)
            .await
            .map_err(op_err("remove network"))
    }

    async fn search_registry(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        self.registry.search(query, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_config_volumes_split_binds_and_mounts() {
        let mut spec = CreateContainerSpec::new("nginx:latest");
        spec.volumes = vec![
            "/srv/site:/usr/share/nginx/html:ro".to_string(),
            "nginx-conf:/etc/nginx".to_string(),
            "malformed".to_string(),
        ];
        let config = container_config(&spec);
        let host = config.host_config.unwrap();
        assert_eq!(
            host.binds.unwrap(),
            vec!["/srv/site:/usr/share/nginx/html:ro".to_string()]
        );
        let mounts = host.mounts.unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source.as_deref(), Some("nginx-conf"));
        assert_eq!(mounts[0].read_only, Some(false));
    }

    #[test]
    fn test_container_config_ports_and_limits() {
        let mut spec = CreateContainerSpec::new("postgres:16");
        spec.ports.insert("5432/tcp".into(), "15432".into());
        spec.memory_limit = Some(512 * 1024 * 1024);
        spec.cpu_quota = Some(100_000);
        spec.restart_policy = Some("always".into());

        let config = container_config(&spec);
        assert!(config.exposed_ports.unwrap().contains_key("5432/tcp"));
        let host = config.host_config.unwrap();
        let binding = host.port_bindings.unwrap()["5432/tcp"].clone().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("15432"));
        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.cpu_quota, Some(100_000));
        assert_eq!(
            host.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::ALWAYS)
        );
        assert!(host.network_mode.is_none());
    }

    #[test]
    fn test_empty_spec_leaves_optional_sections_unset() {
        let config = container_config(&CreateContainerSpec::new("alpine"));
        assert!(config.env.is_none());
        assert!(config.exposed_ports.is_none());
        let host = config.host_config.unwrap();
        assert!(host.binds.is_none());
        assert!(host.restart_policy.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dead_socket_is_connectivity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker.sock");
        // Leaves the socket file behind with nobody accepting on it.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());

        let registry = RegistryClient::new(std::time::Duration::from_secs(5)).unwrap();
        let engine = DockerEngine::connect(path.to_str(), registry).unwrap();

        let err = engine.list_containers(true).await.unwrap_err();
        assert!(err.is_connectivity(), "{:?}", err);
        let err = engine.start_container("web").await.unwrap_err();
        assert!(err.is_connectivity(), "{:?}", err);
    }
}
