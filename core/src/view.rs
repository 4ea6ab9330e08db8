use serde::{Deserialize, Serialize};

use crate::cache::ResourceKind;
use crate::engine::DEFAULT_LOG_TAIL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    List,
    Details,
    Logs,
    Images,
    Volumes,
    Networks,
    Templates,
}

/// Overlays that may be open on top of the current view. Independent of
/// each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overlays {
    pub pull_image: bool,
    pub create_container: bool,
    pub compose_upload: bool,
    pub provisioning: bool,
}

impl Overlays {
    pub fn any(&self) -> bool {
        self.pull_image || self.create_container || self.compose_upload || self.provisioning
    }

    pub fn close_all(&mut self) {
        *self = Overlays::default();
    }
}

/// Single owner of navigation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub current: View,
    pub selected: Option<String>,
    pub show_all: bool,
    pub log_tail: String,
    pub overlays: Overlays,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current: View::List,
            selected: None,
            show_all: true,
            log_tail: DEFAULT_LOG_TAIL.to_string(),
            overlays: Overlays::default(),
        }
    }
}

impl ViewState {
    pub fn navigate(&mut self, view: View) {
        self.current = view;
    }

    /// Open the detail view for one container.
    pub fn open_details(&mut self, id: impl Into<String>) {
        self.selected = Some(id.into());
        self.current = View::Details;
    }

    /// Open the logs view. Without a selection there is nothing to show and
    /// the view stays where it is.
    pub fn open_logs(&mut self) {
        if self.selected.is_some() {
            self.current = View::Logs;
        }
    }

    pub fn back_to_list(&mut self) {
        self.current = View::List;
        self.selected = None;
    }

    pub fn is_viewing(&self, id: &str) -> bool {
        matches!(self.current, View::Details | View::Logs)
            && self.selected.as_deref() == Some(id)
    }

    /// Scope keys that should have a recurring refresh for the current view.
    pub fn scopes(&self) -> Vec<ResourceKind> {
        match (self.current, &self.selected) {
            (View::List, _) => vec![ResourceKind::Containers { all: self.show_all }],
            (View::Details, Some(id)) => vec![
                ResourceKind::Detail { id: id.clone() },
                ResourceKind::Stats { id: id.clone() },
            ],
            (View::Logs, Some(id)) => vec![ResourceKind::Logs {
                id: id.clone(),
                tail: self.log_tail.clone(),
            }],
            (View::Images, _) => vec![ResourceKind::Images],
            (View::Volumes, _) => vec![ResourceKind::Volumes],
            (View::Networks, _) => vec![ResourceKind::Networks],
            (View::Details | View::Logs, None) | (View::Templates, _) => Vec::new(),
        }
    }
}
