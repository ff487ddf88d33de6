//! Session-local set of expanded menu nodes.
//!
//! Never persisted. Cleared whenever the tree is replaced or the sidebar
//! collapses; the auto-expand rule is reapplied from a clean slate.

use std::collections::BTreeSet;

use crate::tree::MenuTree;
use crate::types::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    expanded: BTreeSet<NodeId>,
    sidebar_collapsed: bool,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn expanded_ids(&self) -> Vec<NodeId> {
        self.expanded.iter().copied().collect()
    }

    pub fn is_sidebar_collapsed(&self) -> bool {
        self.sidebar_collapsed
    }

    /// Flips membership and returns the new state.
    pub fn toggle(&mut self, id: NodeId) -> bool {
        if self.expanded.remove(&id) {
            false
        } else {
            self.expanded.insert(id);
            true
        }
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        if expanded {
            self.expanded.insert(id);
        } else {
            self.expanded.remove(&id);
        }
    }

    /// Starts over for a freshly loaded or replaced tree.
    pub fn reset_for_tree(&mut self, tree: &MenuTree) {
        self.expanded.clear();
        if !self.sidebar_collapsed {
            self.expanded.extend(tree.auto_expand_ids());
        }
    }

    pub fn collapse_sidebar(&mut self) {
        self.sidebar_collapsed = true;
        self.expanded.clear();
    }

    pub fn expand_sidebar(&mut self, tree: &MenuTree) {
        self.sidebar_collapsed = false;
        self.reset_for_tree(tree);
    }
}
