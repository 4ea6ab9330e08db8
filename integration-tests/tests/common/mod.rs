use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use dock_core::{
    ContainerDetail, ContainerRecord, ContainerState, CreateContainerSpec, Engine, Error,
    ImageInfo, NetworkInfo, Result, SearchResult, StatsSample, VolumeInfo,
};

/// Scriptable in-memory engine. Every call is recorded by name.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

#[derive(Default)]
pub struct FakeState {
    pub unreachable: bool,
    pub containers: Vec<ContainerRecord>,
    /// Tags present locally.
    pub images: Vec<String>,
    pub list_error: Option<Error>,
    pub images_error: Option<Error>,
    pub image_check_error: Option<Error>,
    pub pull_error: Option<Error>,
    pub remove_error: Option<Error>,
    /// Images whose creation fails.
    pub create_failures: HashSet<String>,
    /// Container ids that refuse to start.
    pub start_failures: HashSet<String>,

    pub calls: Vec<String>,
    /// `all` flag of every list call.
    pub list_args: Vec<bool>,
    pub created: Vec<CreateContainerSpec>,
    pub started: Vec<String>,
    pub removed: Vec<(String, bool)>,
    next_id: usize,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(configure: impl FnOnce(&mut FakeState)) -> Arc<Self> {
        let engine = Self::default();
        configure(&mut engine.state());
        Arc::new(engine)
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: &str) -> MutexGuard<'_, FakeState> {
        let mut state = self.state();
        state.calls.push(call.to_string());
        state
    }
}

pub fn container(id: &str, state: ContainerState) -> ContainerRecord {
    ContainerRecord {
        id: id.to_string(),
        name: format!("/{}", id),
        image: "nginx:alpine".to_string(),
        state,
        status: String::new(),
        ports: Vec::new(),
        created: 0,
    }
}

fn fail(op: &'static str) -> Error {
    Error::operation(op, "scripted failure")
}

#[async_trait]
impl Engine for FakeEngine {
    async fn check_connection(&self) -> Result<bool> {
        let state = self.record("check_connection");
        if state.unreachable {
            return Err(Error::Connectivity("no such socket".to_string()));
        }
        Ok(true)
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>> {
        let mut state = self.record("list_containers");
        state.list_args.push(all);
        if let Some(e) = state.list_error.clone() {
            return Err(e);
        }
        Ok(state
            .containers
            .iter()
            .filter(|c| all || c.state.is_running())
            .cloned()
            .collect())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.record("start_container");
        if state.start_failures.contains(id) {
            return Err(fail("start container"));
        }
        state.started.push(id.to_string());
        Ok(())
    }

    async fn stop_container(&self, _id: &str) -> Result<()> {
        self.record("stop_container");
        Ok(())
    }

    async fn restart_container(&self, _id: &str) -> Result<()> {
        self.record("restart_container");
        Ok(())
    }

    async fn pause_container(&self, _id: &str) -> Result<()> {
        self.record("pause_container");
        Ok(())
    }

    async fn unpause_container(&self, _id: &str) -> Result<()> {
        self.record("unpause_container");
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.record("remove_container");
        if let Some(e) = state.remove_error.clone() {
            return Err(e);
        }
        state.removed.push((id.to_string(), force));
        state.containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn container_logs(&self, id: &str, tail: Option<&str>) -> Result<String> {
        self.record("container_logs");
        Ok(format!("{} tail={}", id, tail.unwrap_or("all")))
    }

    async fn container_details(&self, id: &str) -> Result<ContainerDetail> {
        let state = self.record("container_details");
        let record = state
            .containers
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| fail("inspect container"))?;
        Ok(ContainerDetail {
            id: record.id.clone(),
            name: record.name.clone(),
            image: record.image.clone(),
            state: record.state.clone(),
            status: record.status.clone(),
            created: String::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            env: Vec::new(),
            networks: BTreeMap::new(),
        })
    }

    async fn container_stats(&self, _id: &str) -> Result<StatsSample> {
        self.record("container_stats");
        Ok(StatsSample {
            cpu_usage: 1.5,
            memory_usage: 64,
            memory_limit: 128,
            memory_percent: 50.0,
            network_rx: 10,
            network_tx: 20,
        })
    }

    async fn create_container(&self, spec: &CreateContainerSpec) -> Result<String> {
        let mut state = self.record("create_container");
        if state.create_failures.contains(&spec.image) {
            return Err(fail("create container"));
        }
        state.next_id += 1;
        let id = format!("c{}", state.next_id);
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let state = self.record("list_images");
        if let Some(e) = state.images_error.clone() {
            return Err(e);
        }
        Ok(state
            .images
            .iter()
            .enumerate()
            .map(|(i, tag)| ImageInfo {
                id: format!("sha256:{}", i),
                repo_tags: vec![tag.clone()],
                size: 0,
                created: 0,
            })
            .collect())
    }

    async fn remove_image(&self, _id: &str, _force: bool) -> Result<()> {
        self.record("remove_image");
        Ok(())
    }

    async fn pull_image(&self, name: &str) -> Result<()> {
        let mut state = self.record("pull_image");
        if let Some(e) = state.pull_error.clone() {
            return Err(e);
        }
        state.images.push(name.to_string());
        Ok(())
    }

    async fn image_exists(&self, name: &str) -> Result<bool> {
        let state = self.record("image_exists");
        if let Some(e) = state.image_check_error.clone() {
            return Err(e);
        }
        Ok(state.images.iter().any(|tag| tag == name))
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        self.record("list_volumes");
        Ok(Vec::new())
    }

    async fn create_volume(&self, name: &str) -> Result<String> {
        self.record("create_volume");
        Ok(name.to_string())
    }

    async fn remove_volume(&self, _name: &str, _force: bool) -> Result<()> {
        self.record("remove_volume");
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>> {
        self.record("list_networks");
        Ok(Vec::new())
    }

    async fn create_network(&self, name: &str, _driver: Option<&str>) -> Result<String> {
        self.record("create_network");
        Ok(format!("net-{}", name))
    }

    async fn remove_network(&self, _id: &str) -> Result<()> {
        self.record("remove_network");
        Ok(())
    }

    async fn search_registry(&self, _query: &str, _limit: Option<usize>) -> Result<Vec<SearchResult>> {
        self.record("search_registry");
        Ok(Vec::new())
    }
}
