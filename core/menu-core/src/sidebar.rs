//! View model for the rendered sidebar.
//!
//! Binds the current tree to its expansion state, the toggle controller and
//! the current location. Hosts call [`SidebarModel::replace_tree`] whenever
//! the engine publishes a different tree and read [`SidebarModel::rows`] to
//! draw.

use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{HomeRoute, MenuConfig};
use crate::expansion::ExpansionState;
use crate::toggle::{DeviceCapabilities, DeviceClass, ToggleController, ToggleOutcome, ToggleSource};
use crate::tree::{MenuRow, MenuTree};
use crate::types::NodeId;

#[derive(Debug)]
pub struct SidebarModel {
    tree: Arc<MenuTree>,
    expansion: ExpansionState,
    toggles: ToggleController,
    location: String,
    home: HomeRoute,
}

impl SidebarModel {
    /// Device capabilities are read once here and never re-evaluated.
    pub fn new(capabilities: DeviceCapabilities, config: &MenuConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            tree: Arc::new(MenuTree::empty()),
            expansion: ExpansionState::new(),
            toggles: ToggleController::new(capabilities, config.toggle_cooldown(), clock),
            location: String::from("/"),
            home: config.home.clone(),
        }
    }

    pub fn tree(&self) -> &Arc<MenuTree> {
        &self.tree
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    pub fn device(&self) -> DeviceClass {
        self.toggles.device()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Swaps in a new tree. Handing back the tree already shown is a no-op,
    /// so re-publishing a cache hit does not wipe what the user opened.
    pub fn replace_tree(&mut self, tree: Arc<MenuTree>) {
        if Arc::ptr_eq(&self.tree, &tree) {
            return;
        }
        debug!(nodes = tree.len(), "Sidebar tree replaced");
        self.tree = tree;
        self.toggles.reset();
        self.expansion.reset_for_tree(&self.tree);
    }

    /// Unknown ids and leaves are dropped.
    pub fn toggle(&mut self, id: NodeId, source: ToggleSource) -> ToggleOutcome {
        let expandable = self.tree.node(id).is_some_and(|node| node.has_children());
        if !expandable || self.expansion.is_sidebar_collapsed() {
            return ToggleOutcome::Dropped { id };
        }
        self.toggles.request(id, source, &mut self.expansion)
    }

    pub fn is_sidebar_collapsed(&self) -> bool {
        self.expansion.is_sidebar_collapsed()
    }

    pub fn set_sidebar_collapsed(&mut self, collapsed: bool) {
        if collapsed == self.expansion.is_sidebar_collapsed() {
            return;
        }
        if collapsed {
            self.expansion.collapse_sidebar();
        } else {
            self.expansion.expand_sidebar(&self.tree);
        }
        self.toggles.reset();
    }

    pub fn navigate(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn rows(&self) -> Vec<MenuRow> {
        self.tree
            .visible_rows(&self.expansion, &self.location, &self.home)
    }

    pub fn active_node(&self) -> Option<NodeId> {
        self.tree.active_node(&self.location, &self.home)
    }

    pub fn active_trail(&self) -> Vec<NodeId> {
        self.tree.active_trail(&self.location, &self.home)
    }
}
