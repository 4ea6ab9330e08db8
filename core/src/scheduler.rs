//! Recurring refresh of the cache for whichever views are mounted.
//!
//! Each mounted view owns at most one timer task bound to its scope key. The
//! timers are children of a connection token: losing the engine cancels all
//! of them at once, and only an explicit [`SyncScheduler::retry_connection`]
//! starts them again.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{ResourceCache, ResourceKind};
use crate::error::{Error, Result};
use crate::view::ViewState;

pub type ViewId = String;

const EVENT_CAPACITY: usize = 64;
const VIEW_SLOT_PREFIX: &str = "view-";

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub refresh_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
        }
    }
}

/// Published after every tick so views can re-read the cache or show errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Refreshed { view: ViewId, kind: ResourceKind },
    RefreshFailed { view: ViewId, kind: ResourceKind, error: Error },
    ConnectionLost { error: Error },
}

struct Timer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Timer {
    fn stop(self) {
        self.token.cancel();
        self.handle.abort();
    }

    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

struct MountedView {
    scope: ResourceKind,
    timer: Option<Timer>,
}

#[derive(Default)]
struct SchedulerState {
    /// Present while the last probe succeeded; cancelled when a tick sees the
    /// engine go away.
    connection: Option<CancellationToken>,
    views: HashMap<ViewId, MountedView>,
}

impl SchedulerState {
    fn connection(&self) -> Option<&CancellationToken> {
        self.connection.as_ref().filter(|t| !t.is_cancelled())
    }
}

impl Drop for SchedulerState {
    fn drop(&mut self) {
        for view in self.views.values_mut() {
            if let Some(timer) = view.timer.take() {
                timer.stop();
            }
        }
    }
}

pub struct SyncScheduler {
    cache: ResourceCache,
    settings: SchedulerSettings,
    events: broadcast::Sender<SyncEvent>,
    state: Mutex<SchedulerState>,
}

impl SyncScheduler {
    pub fn new(cache: ResourceCache, settings: SchedulerSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cache,
            settings,
            events,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Probe the engine. On success every mounted view starts ticking; on
    /// failure no timer runs until the next explicit retry.
    pub async fn connect(&self) -> Result<()> {
        let probe = match self.cache.engine().check_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Connectivity("engine reported not ready".to_string())),
            Err(Error::Connectivity(msg)) => Err(Error::Connectivity(msg)),
            Err(other) => Err(Error::Connectivity(other.to_string())),
        };

        let mut state = self.state.lock().await;
        if let Some(old) = state.connection.take() {
            old.cancel();
        }

        if let Err(e) = probe {
            warn!("Engine connectivity probe failed: {}", e);
            for view in state.views.values_mut() {
                if let Some(timer) = view.timer.take() {
                    timer.stop();
                }
            }
            return Err(e);
        }

        info!("Engine reachable, starting refresh for {} views", state.views.len());
        let connection = CancellationToken::new();
        state.connection = Some(connection.clone());
        let views: Vec<ViewId> = state.views.keys().cloned().collect();
        for view in views {
            self.restart_timer(&mut state, &view, &connection);
        }
        Ok(())
    }

    /// User-triggered reconnect. Never called automatically.
    pub async fn retry_connection(&self) -> Result<()> {
        info!("Retrying engine connection");
        self.connect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connection().is_some()
    }

    /// Register `view` with `scope`. Mounting an already mounted view with a
    /// different scope behaves like [`SyncScheduler::set_scope`].
    pub async fn mount(&self, view: impl Into<ViewId>, scope: ResourceKind) {
        let view = view.into();
        let mut state = self.state.lock().await;
        if let Some(existing) = state.views.get(&view) {
            if existing.scope == scope {
                return;
            }
        }
        debug!("Mounting view {} with scope {}", view, scope);
        if let Some(old) = state.views.insert(
            view.clone(),
            MountedView {
                scope,
                timer: None,
            },
        ) {
            if let Some(timer) = old.timer {
                timer.stop();
            }
        }
        if let Some(connection) = state.connection().cloned() {
            self.restart_timer(&mut state, &view, &connection);
        }
    }

    pub async fn unmount(&self, view: &str) {
        let mut state = self.state.lock().await;
        if let Some(mounted) = state.views.remove(view) {
            debug!("Unmounting view {} ({})", view, mounted.scope);
            if let Some(timer) = mounted.timer {
                timer.stop();
            }
        }
    }

    /// Replace the scope of a mounted view. The old timer is torn down and a
    /// fresh one started, so no tick ever mixes the two scopes.
    pub async fn set_scope(&self, view: &str, scope: ResourceKind) {
        self.mount(view, scope).await;
    }

    /// Mount exactly the scopes `view_state` needs, in slots `view-0..n`.
    pub async fn sync_view(&self, view_state: &ViewState) {
        let scopes = view_state.scopes();
        let wanted: Vec<ViewId> = (0..scopes.len())
            .map(|i| format!("{}{}", VIEW_SLOT_PREFIX, i))
            .collect();

        let stale: Vec<ViewId> = {
            let state = self.state.lock().await;
            state
                .views
                .keys()
                .filter(|v| v.starts_with(VIEW_SLOT_PREFIX) && !wanted.contains(v))
                .cloned()
                .collect()
        };
        for view in stale {
            self.unmount(&view).await;
        }
        for (view, scope) in wanted.into_iter().zip(scopes) {
            self.mount(view, scope).await;
        }
    }

    pub async fn mounted_views(&self) -> Vec<(ViewId, ResourceKind)> {
        let state = self.state.lock().await;
        let mut views: Vec<_> = state
            .views
            .iter()
            .map(|(id, v)| (id.clone(), v.scope.clone()))
            .collect();
        views.sort_by(|a, b| a.0.cmp(&b.0));
        views
    }

    /// Timers currently ticking.
    pub async fn active_timers(&self) -> usize {
        let state = self.state.lock().await;
        state
            .views
            .values()
            .filter(|v| v.timer.as_ref().is_some_and(Timer::is_active))
            .count()
    }

    /// Stop every timer and forget the connection. Mounted views are kept.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(connection) = state.connection.take() {
            connection.cancel();
        }
        for view in state.views.values_mut() {
            if let Some(timer) = view.timer.take() {
                timer.stop();
            }
        }
        info!("Scheduler stopped");
    }

    fn restart_timer(
        &self,
        state: &mut SchedulerState,
        view: &ViewId,
        connection: &CancellationToken,
    ) {
        let Some(mounted) = state.views.get_mut(view) else {
            return;
        };
        if let Some(timer) = mounted.timer.take() {
            timer.stop();
        }

        let token = connection.child_token();
        let handle = tokio::spawn(run_timer(
            self.cache.clone(),
            view.clone(),
            mounted.scope.clone(),
            self.settings.refresh_interval,
            token.clone(),
            connection.clone(),
            self.events.clone(),
        ));
        info!(
            "Started refresh timer for view {} ({}) every {:?}",
            view, mounted.scope, self.settings.refresh_interval
        );
        mounted.timer = Some(Timer { token, handle });
    }
}

async fn run_timer(
    cache: ResourceCache,
    view: ViewId,
    kind: ResourceKind,
    period: Duration,
    token: CancellationToken,
    connection: CancellationToken,
    events: broadcast::Sender<SyncEvent>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Dropping the refresh on cancel discards its result.
        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = cache.refresh(&kind) => result,
        };

        match result {
            Ok(_) => {
                let _ = events.send(SyncEvent::Refreshed {
                    view: view.clone(),
                    kind: kind.clone(),
                });
            }
            Err(e) if e.is_connectivity() => {
                warn!("Engine unreachable during refresh of {}: {}", kind, e);
                let _ = events.send(SyncEvent::ConnectionLost { error: e });
                connection.cancel();
                break;
            }
            Err(e) => {
                warn!("Refresh of {} for view {} failed: {}", kind, view, e);
                let _ = events.send(SyncEvent::RefreshFailed {
                    view: view.clone(),
                    kind: kind.clone(),
                    error: e,
                });
            }
        }
    }

    debug!("Refresh timer for view {} ({}) stopped", view, kind);
}
