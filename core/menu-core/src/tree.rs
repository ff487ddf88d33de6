//! Immutable menu tree with active-node and auto-expand logic.
//!
//! The nested [`MenuNode`] payload is flattened into an arena indexed by
//! position, with an id → index map. Every walk is iterative, so hostile
//! nesting cannot blow the stack. A tree is never edited after
//! construction; refreshes build a new one and swap it in wholesale.
//!
//! # Active node rules
//!
//! Backends routinely hand out overlapping paths (a section and its only
//! page sharing a URL, or several entries pointing at the dashboard). The
//! rules, applied per node against the current location:
//!
//! 1. Exact match is active, unless exactly one direct child also matches
//!    exactly. The child is more specific and wins.
//! 2. The home path is only ever active for the designated home node. Other
//!    nodes sharing that literal path are excluded from matching entirely.
//! 3. Prefix match (`location` starts with `path + "/"`) is active unless a
//!    descendant matches more specifically.
//! 4. Anything else is inactive.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::HomeRoute;
use crate::error::{MenuError, Result};
use crate::expansion::ExpansionState;
use crate::types::{MenuNode, NodeId};

/// A flattened node. `children` are arena indices in `sort_order`.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    pub slug: String,
    pub path: Option<String>,
    pub icon: String,
    pub level: u32,
    pub sort_order: i32,
    pub badge_text: Option<String>,
    pub badge_color: Option<String>,
    pub depth: usize,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl TreeNode {
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    fn normalized_path(&self) -> Option<&str> {
        self.path.as_deref().map(normalize_location)
    }
}

/// One line of the rendered sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRow {
    pub id: NodeId,
    pub name: String,
    pub slug: String,
    pub path: Option<String>,
    pub icon: String,
    pub depth: usize,
    pub badge_text: Option<String>,
    pub badge_color: Option<String>,
    pub has_children: bool,
    pub expanded: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuTree {
    menus: Vec<MenuNode>,
    nodes: Vec<TreeNode>,
    roots: Vec<usize>,
    index: HashMap<NodeId, usize>,
}

impl MenuTree {
    /// Builds a tree, ordering siblings by `sort_order`.
    ///
    /// Duplicate ids are rejected as a malformed response.
    pub fn new(menus: Vec<MenuNode>) -> Result<Self> {
        let mut menus = menus;
        sort_nested(&mut menus);

        let mut nodes: Vec<TreeNode> = Vec::new();
        let mut roots = Vec::with_capacity(menus.len());
        let mut index = HashMap::new();

        let mut stack: Vec<(&MenuNode, Option<usize>, usize)> =
            menus.iter().rev().map(|node| (node, None, 0)).collect();

        while let Some((node, parent, depth)) = stack.pop() {
            let position = nodes.len();
            if index.insert(node.id, position).is_some() {
                return Err(MenuError::malformed(format!(
                    "menu node id {} appears more than once",
                    node.id
                )));
            }

            nodes.push(TreeNode {
                id: node.id,
                name: node.name.clone(),
                slug: node.slug.clone(),
                path: node.path.clone(),
                icon: node.icon.clone(),
                level: node.level,
                sort_order: node.sort_order,
                badge_text: node.badge_text.clone(),
                badge_color: node.badge_color.clone(),
                depth,
                parent,
                children: Vec::with_capacity(node.children.len()),
            });

            match parent {
                Some(parent) => nodes[parent].children.push(position),
                None => roots.push(position),
            }

            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .map(|child| (child, Some(position), depth + 1)),
            );
        }

        Ok(Self {
            menus,
            nodes,
            roots,
            index,
        })
    }

    pub fn empty() -> Self {
        Self {
            menus: Vec::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The nested payload, siblings sorted.
    pub fn menus(&self) -> &[MenuNode] {
        &self.menus
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.roots.iter().map(move |&idx| &self.nodes[idx])
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.index.get(&id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn children(&self, id: NodeId) -> Vec<&TreeNode> {
        self.index
            .get(&id)
            .map(|&idx| {
                self.nodes[idx]
                    .children
                    .iter()
                    .map(|&child| &self.nodes[child])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<&TreeNode> {
        let idx = *self.index.get(&id)?;
        self.nodes[idx].parent.map(|parent| &self.nodes[parent])
    }

    /// Nodes in pre-order. Arena order already is pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.nodes.iter()
    }

    /// Nodes that open on their own: exactly one child.
    pub fn auto_expand_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.children.len() == 1)
            .map(|node| node.id)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Active node
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn is_active(&self, id: NodeId, location: &str, home: &HomeRoute) -> bool {
        let Some(&idx) = self.index.get(&id) else {
            return false;
        };
        let matcher = ActiveMatcher::new(self, location, home);
        matcher.is_active(idx)
    }

    /// Every active node, in pre-order.
    pub fn active_nodes(&self, location: &str, home: &HomeRoute) -> Vec<NodeId> {
        let matcher = ActiveMatcher::new(self, location, home);
        (0..self.nodes.len())
            .filter(|&idx| matcher.is_active(idx))
            .map(|idx| self.nodes[idx].id)
            .collect()
    }

    /// The deepest active node; earliest in pre-order on ties.
    pub fn active_node(&self, location: &str, home: &HomeRoute) -> Option<NodeId> {
        let matcher = ActiveMatcher::new(self, location, home);
        let mut best: Option<usize> = None;
        for idx in 0..self.nodes.len() {
            if !matcher.is_active(idx) {
                continue;
            }
            let deeper = best.map_or(true, |current| {
                self.nodes[idx].depth > self.nodes[current].depth
            });
            if deeper {
                best = Some(idx);
            }
        }
        best.map(|idx| self.nodes[idx].id)
    }

    /// Root-to-leaf ids ending at the active node.
    pub fn active_trail(&self, location: &str, home: &HomeRoute) -> Vec<NodeId> {
        let Some(active) = self.active_node(location, home) else {
            return Vec::new();
        };
        let mut trail = Vec::new();
        let mut cursor = self.index.get(&active).copied();
        while let Some(idx) = cursor {
            trail.push(self.nodes[idx].id);
            cursor = self.nodes[idx].parent;
        }
        trail.reverse();
        trail
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Flattening
    // ─────────────────────────────────────────────────────────────────────────────

    /// Rows to draw, depth-first, descending only into expanded nodes.
    /// A collapsed sidebar shows top-level entries only.
    pub fn visible_rows(
        &self,
        expansion: &ExpansionState,
        location: &str,
        home: &HomeRoute,
    ) -> Vec<MenuRow> {
        let matcher = ActiveMatcher::new(self, location, home);
        let collapsed = expansion.is_sidebar_collapsed();
        let mut rows = Vec::new();
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let expanded = !collapsed && node.has_children() && expansion.is_expanded(node.id);

            rows.push(MenuRow {
                id: node.id,
                name: node.name.clone(),
                slug: node.slug.clone(),
                path: node.path.clone(),
                icon: node.icon.clone(),
                depth: node.depth,
                badge_text: node.badge_text.clone(),
                badge_color: node.badge_color.clone(),
                has_children: node.has_children(),
                expanded,
                active: matcher.is_active(idx),
            });

            if expanded {
                stack.extend(node.children.iter().rev().copied());
            }
        }

        rows
    }

    /// Ids of nodes whose name or slug contains `query`, plus their
    /// ancestors, in pre-order. An empty query matches nothing.
    pub fn search(&self, query: &str) -> Vec<NodeId> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut keep: HashSet<usize> = HashSet::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            let hit = node.name.to_lowercase().contains(&needle)
                || node.slug.to_lowercase().contains(&needle);
            if !hit {
                continue;
            }
            let mut cursor = Some(idx);
            while let Some(current) = cursor {
                if !keep.insert(current) {
                    break;
                }
                cursor = self.nodes[current].parent;
            }
        }

        (0..self.nodes.len())
            .filter(|idx| keep.contains(idx))
            .map(|idx| self.nodes[idx].id)
            .collect()
    }
}

/// Precomputed state for evaluating the active-node rules against one location.
struct ActiveMatcher<'a> {
    tree: &'a MenuTree,
    location: &'a str,
    home_path: &'a str,
    home_node: Option<usize>,
}

impl<'a> ActiveMatcher<'a> {
    fn new(tree: &'a MenuTree, location: &'a str, home: &'a HomeRoute) -> Self {
        let home_path = normalize_location(&home.path);
        Self {
            tree,
            location: normalize_location(location),
            home_path,
            home_node: designated_home(tree, home_path, home.slug.as_deref()),
        }
    }

    /// Path usable for matching, or None for pathless and excluded home duplicates.
    fn match_path(&self, idx: usize) -> Option<&'a str> {
        let path = self.tree.nodes[idx].normalized_path()?;
        if path == self.home_path && self.home_node != Some(idx) {
            return None;
        }
        Some(path)
    }

    fn is_exact(&self, idx: usize) -> bool {
        self.match_path(idx) == Some(self.location)
    }

    fn is_active(&self, idx: usize) -> bool {
        let Some(path) = self.match_path(idx) else {
            return false;
        };

        if path == self.location {
            let exact_children = self.tree.nodes[idx]
                .children
                .iter()
                .filter(|&&child| self.is_exact(child))
                .count();
            return exact_children != 1;
        }

        if is_prefix_of(path, self.location) {
            return !self.descendant_more_specific(idx, path.len());
        }

        false
    }

    fn descendant_more_specific(&self, idx: usize, ancestor_len: usize) -> bool {
        let mut stack: Vec<usize> = self.tree.nodes[idx].children.clone();
        while let Some(current) = stack.pop() {
            if let Some(path) = self.match_path(current) {
                if path == self.location
                    || (path.len() > ancestor_len && is_prefix_of(path, self.location))
                {
                    return true;
                }
            }
            stack.extend(self.tree.nodes[current].children.iter().copied());
        }
        false
    }
}

fn designated_home(tree: &MenuTree, home_path: &str, slug: Option<&str>) -> Option<usize> {
    let on_home_path = |node: &&TreeNode| node.normalized_path() == Some(home_path);

    if let Some(slug) = slug {
        let by_slug = tree
            .nodes
            .iter()
            .enumerate()
            .find(|(_, node)| on_home_path(node) && node.slug == slug)
            .map(|(idx, _)| idx);
        if by_slug.is_some() {
            return by_slug;
        }
    }

    tree.nodes
        .iter()
        .enumerate()
        .find(|(_, node)| on_home_path(node))
        .map(|(idx, _)| idx)
}

/// `location` lies strictly under `path`.
fn is_prefix_of(path: &str, location: &str) -> bool {
    if path == "/" {
        return false;
    }
    location
        .strip_prefix(path)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Drops query string, fragment and trailing slashes. `/` stays `/`.
pub fn normalize_location(location: &str) -> &str {
    let end = location
        .find(|c| c == '?' || c == '#')
        .unwrap_or(location.len());
    let trimmed = location[..end].trim_end_matches('/');
    if trimmed.is_empty() && location.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

fn sort_nested(menus: &mut Vec<MenuNode>) {
    let mut stack: Vec<&mut Vec<MenuNode>> = vec![menus];
    while let Some(level) = stack.pop() {
        level.sort_by_key(|node| node.sort_order);
        for node in level {
            stack.push(&mut node.children);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn leaf(id: NodeId, path: &str, sort_order: i32) -> MenuNode {
        MenuNode {
            id,
            name: format!("Item {}", id),
            slug: format!("item-{}", id),
            path: Some(path.to_string()),
            icon: "dot".to_string(),
            level: 0,
            sort_order,
            badge_text: None,
            badge_color: None,
            children: Vec::new(),
        }
    }

    pub fn section(id: NodeId, path: Option<&str>, children: Vec<MenuNode>) -> MenuNode {
        MenuNode {
            path: path.map(str::to_string),
            children,
            ..leaf(id, "", id as i32)
        }
    }
}
