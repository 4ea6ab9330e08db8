use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::Result;
use crate::types::{
    ContainerDetail, ContainerRecord, ContainerState, ImageInfo, NetworkInfo, StatsSample,
    VolumeInfo,
};

/// What one cache slot holds: resource kind plus target id and filters.
///
/// This is also the scope key a recurring refresh is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Containers { all: bool },
    Images,
    Volumes,
    Networks,
    Detail { id: String },
    Stats { id: String },
    Logs { id: String, tail: String },
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Containers { all: true } => write!(f, "containers(all)"),
            ResourceKind::Containers { all: false } => write!(f, "containers(running)"),
            ResourceKind::Images => write!(f, "images"),
            ResourceKind::Volumes => write!(f, "volumes"),
            ResourceKind::Networks => write!(f, "networks"),
            ResourceKind::Detail { id } => write!(f, "detail({})", id),
            ResourceKind::Stats { id } => write!(f, "stats({})", id),
            ResourceKind::Logs { id, tail } => write!(f, "logs({}, tail={})", id, tail),
        }
    }
}

/// One engine response, never patched after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub data: T,
    pub refreshed_at: OffsetDateTime,
}

impl<T> Snapshot<T> {
    fn new(data: T) -> Arc<Self> {
        Arc::new(Self {
            data,
            refreshed_at: OffsetDateTime::now_utc(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedSnapshot {
    Containers(Arc<Snapshot<Vec<ContainerRecord>>>),
    Images(Arc<Snapshot<Vec<ImageInfo>>>),
    Volumes(Arc<Snapshot<Vec<VolumeInfo>>>),
    Networks(Arc<Snapshot<Vec<NetworkInfo>>>),
    Detail(Arc<Snapshot<ContainerDetail>>),
    Stats(Arc<Snapshot<StatsSample>>),
    Logs(Arc<Snapshot<String>>),
}

impl CachedSnapshot {
    pub fn refreshed_at(&self) -> OffsetDateTime {
        match self {
            CachedSnapshot::Containers(s) => s.refreshed_at,
            CachedSnapshot::Images(s) => s.refreshed_at,
            CachedSnapshot::Volumes(s) => s.refreshed_at,
            CachedSnapshot::Networks(s) => s.refreshed_at,
            CachedSnapshot::Detail(s) => s.refreshed_at,
            CachedSnapshot::Stats(s) => s.refreshed_at,
            CachedSnapshot::Logs(s) => s.refreshed_at,
        }
    }
}

/// Per-kind snapshots of engine state.
///
/// A refresh builds the complete new snapshot before taking the write lock and
/// swaps it in whole, so readers only ever see one engine response per slot.
/// A failed refresh leaves the previous snapshot in place.
#[derive(Clone)]
pub struct ResourceCache {
    engine: Arc<dyn Engine>,
    state: Arc<RwLock<CacheState>>,
}

#[derive(Default)]
struct CacheState {
    snapshots: HashMap<ResourceKind, CachedSnapshot>,
}

impl ResourceCache {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            state: Arc::new(RwLock::new(CacheState::default())),
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Fetch `kind` from the engine and replace its snapshot.
    ///
    /// Stats are only sampled while the container's last known state is
    /// running; otherwise the stats slot is cleared and `Ok(None)` returned.
    pub async fn refresh(&self, kind: &ResourceKind) -> Result<Option<CachedSnapshot>> {
        debug!("Refreshing {}", kind);

        if let ResourceKind::Stats { id } = kind {
            let running = self
                .last_known_state(id)
                .await
                .is_some_and(|s| s.is_running());
            if !running {
                self.evict(kind).await;
                return Ok(None);
            }
        }

        let fetched = match self.fetch(kind).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Refresh of {} failed, keeping previous snapshot: {}", kind, e);
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        state.snapshots.insert(kind.clone(), fetched.clone());
        Ok(Some(fetched))
    }

    async fn fetch(&self, kind: &ResourceKind) -> Result<CachedSnapshot> {
        let engine = &self.engine;
        Ok(match kind {
            ResourceKind::Containers { all } => {
                CachedSnapshot::Containers(Snapshot::new(engine.list_containers(*all).await?))
            }
            ResourceKind::Images => CachedSnapshot::Images(Snapshot::new(engine.list_images().await?)),
            ResourceKind::Volumes => {
                CachedSnapshot::Volumes(Snapshot::new(engine.list_volumes().await?))
            }
            ResourceKind::Networks => {
                CachedSnapshot::Networks(Snapshot::new(engine.list_networks().await?))
            }
            ResourceKind::Detail { id } => {
                CachedSnapshot::Detail(Snapshot::new(engine.container_details(id).await?))
            }
            ResourceKind::Stats { id } => {
                CachedSnapshot::Stats(Snapshot::new(engine.container_stats(id).await?))
            }
            ResourceKind::Logs { id, tail } => CachedSnapshot::Logs(Snapshot::new(
                engine.container_logs(id, Some(tail.as_str())).await?,
            )),
        })
    }

    pub async fn get(&self, kind: &ResourceKind) -> Option<CachedSnapshot> {
        self.state.read().await.snapshots.get(kind).cloned()
    }

    pub async fn containers(&self, all: bool) -> Option<Arc<Snapshot<Vec<ContainerRecord>>>> {
        match self.get(&ResourceKind::Containers { all }).await? {
            CachedSnapshot::Containers(s) => Some(s),
            _ => None,
        }
    }

    pub async fn images(&self) -> Option<Arc<Snapshot<Vec<ImageInfo>>>> {
        match self.get(&ResourceKind::Images).await? {
            CachedSnapshot::Images(s) => Some(s),
            _ => None,
        }
    }

    pub async fn volumes(&self) -> Option<Arc<Snapshot<Vec<VolumeInfo>>>> {
        match self.get(&ResourceKind::Volumes).await? {
            CachedSnapshot::Volumes(s) => Some(s),
            _ => None,
        }
    }

    pub async fn networks(&self) -> Option<Arc<Snapshot<Vec<NetworkInfo>>>> {
        match self.get(&ResourceKind::Networks).await? {
            CachedSnapshot::Networks(s) => Some(s),
            _ => None,
        }
    }

    pub async fn detail(&self, id: &str) -> Option<Arc<Snapshot<ContainerDetail>>> {
        match self.get(&ResourceKind::Detail { id: id.to_string() }).await? {
            CachedSnapshot::Detail(s) => Some(s),
            _ => None,
        }
    }

    pub async fn stats(&self, id: &str) -> Option<Arc<Snapshot<StatsSample>>> {
        match self.get(&ResourceKind::Stats { id: id.to_string() }).await? {
            CachedSnapshot::Stats(s) => Some(s),
            _ => None,
        }
    }

    pub async fn logs(&self, id: &str, tail: &str) -> Option<Arc<Snapshot<String>>> {
        let kind = ResourceKind::Logs {
            id: id.to_string(),
            tail: tail.to_string(),
        };
        match self.get(&kind).await? {
            CachedSnapshot::Logs(s) => Some(s),
            _ => None,
        }
    }

    /// Newest state the cache has seen for `id`: detail first, then any list.
    pub async fn last_known_state(&self, id: &str) -> Option<ContainerState> {
        let state = self.state.read().await;
        let detail_kind = ResourceKind::Detail { id: id.to_string() };
        if let Some(CachedSnapshot::Detail(detail)) = state.snapshots.get(&detail_kind) {
            return Some(detail.data.state.clone());
        }

        state
            .snapshots
            .values()
            .filter_map(|s| match s {
                CachedSnapshot::Containers(list) => Some(list),
                _ => None,
            })
            .max_by_key(|list| list.refreshed_at)
            .and_then(|list| list.data.iter().find(|c| c.id == id))
            .map(|c| c.state.clone())
    }

    pub async fn evict(&self, kind: &ResourceKind) {
        self.state.write().await.snapshots.remove(kind);
    }

    /// Drop every per-container slot for `id` (detail, stats, logs).
    pub async fn forget_container(&self, id: &str) {
        let mut state = self.state.write().await;
        state.snapshots.retain(|kind, _| match kind {
            ResourceKind::Detail { id: k }
            | ResourceKind::Stats { id: k }
            | ResourceKind::Logs { id: k, .. } => k != id,
            _ => true,
        });
    }
}

/// Lines of `text` containing `query`, case-insensitively. An empty query
/// keeps every line.
pub fn filter_log_lines<'a>(text: &'a str, query: &str) -> Vec<&'a str> {
    let needle = query.to_lowercase();
    text.lines()
        .filter(|line| needle.is_empty() || line.to_lowercase().contains(&needle))
        .collect()
}
