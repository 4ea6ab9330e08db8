use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{ResourceCache, ResourceKind};
use crate::error::{Error, Result};
use crate::view::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
    Remove,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Pause => "pause",
            Action::Unpause => "unpause",
            Action::Remove => "remove",
        }
    }

    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Action::Remove)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            "restart" => Ok(Action::Restart),
            "pause" => Ok(Action::Pause),
            "unpause" => Ok(Action::Unpause),
            "remove" | "rm" => Ok(Action::Remove),
            other => Err(Error::validation(format!("Unknown action: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// The caller declined the confirmation; no engine call was made.
    Declined,
}

/// Applies lifecycle actions, one at a time per container id.
///
/// Every call ends with exactly one refresh of the container list, whether
/// the action succeeded, failed or was declined.
pub struct ActionDispatcher {
    cache: ResourceCache,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ActionDispatcher {
    pub fn new(cache: ResourceCache) -> Self {
        Self {
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.in_flight.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply `action` to container `id`.
    ///
    /// `confirm` is only consulted for [`Action::Remove`]. A successful remove
    /// drops the container's cached detail and returns `view` to the list.
    pub async fn apply<F>(
        &self,
        action: Action,
        id: &str,
        view: &mut ViewState,
        confirm: F,
    ) -> Result<ActionOutcome>
    where
        F: FnOnce(&str) -> bool,
    {
        let lock = self.lock_for(id).await;
        let guard = lock.lock().await;

        let result = self.dispatch(action, id, view, confirm).await;
        if let Err(e) = &result {
            warn!("{} {} failed: {}", action, id, e);
        }

        let kind = ResourceKind::Containers { all: view.show_all };
        if let Err(e) = self.cache.refresh(&kind).await {
            warn!("Refresh after {} {} failed: {}", action, id, e);
        }

        drop(guard);
        self.release(id, &lock).await;
        result
    }

    async fn dispatch<F>(
        &self,
        action: Action,
        id: &str,
        view: &mut ViewState,
        confirm: F,
    ) -> Result<ActionOutcome>
    where
        F: FnOnce(&str) -> bool,
    {
        let engine = self.cache.engine();
        debug!("Dispatching {} {}", action, id);
        match action {
            Action::Start => engine.start_container(id).await?,
            Action::Stop => engine.stop_container(id).await?,
            Action::Restart => engine.restart_container(id).await?,
            Action::Pause => engine.pause_container(id).await?,
            Action::Unpause => engine.unpause_container(id).await?,
            Action::Remove => {
                if !confirm(id) {
                    info!("Removal of {} declined", id);
                    return Ok(ActionOutcome::Declined);
                }
                engine.remove_container(id, false).await?;
                self.cache.forget_container(id).await;
                view.back_to_list();
            }
        }
        info!("{} {} done", action, id);
        Ok(ActionOutcome::Applied)
    }

    /// Forget the per-id lock once nobody else is waiting on it.
    async fn release(&self, id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.in_flight.lock().await;
        // Map entry plus our clone.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(id);
        }
    }
}
