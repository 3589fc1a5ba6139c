//! Menu trees and the permission filter.
//!
//! Pure functions: the static tree is never mutated, filtering builds a new one.

use serde::{Deserialize, Serialize};

use nova_core::MenuId;

use crate::Permission;

/// A navigation menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    pub id: MenuId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, alias = "permission", skip_serializing_if = "Option::is_none")]
    pub required_permission: Option<Permission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    pub fn new(id: impl Into<MenuId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            path: None,
            icon: None,
            required_permission: None,
            children: Vec::new(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn requires(mut self, permission: impl Into<Permission>) -> Self {
        self.required_permission = Some(permission.into());
        self
    }

    pub fn children(mut self, children: Vec<MenuNode>) -> Self {
        self.children = children;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn matches_path(&self, path: &str) -> bool {
        self.path.as_deref() == Some(path)
    }
}

fn is_granted<'a, I>(required: Option<&Permission>, granted: I) -> bool
where
    I: IntoIterator<Item = &'a Permission>,
{
    match required {
        None => true,
        Some(required) => granted
            .into_iter()
            .any(|p| p.is_wildcard() || p == required),
    }
}

/// Filter `tree` down to what `granted` may see.
///
/// A leaf survives when it has no requirement, or its permission (or `"*"`)
/// is granted. A node with children survives iff at least one child
/// survives, whatever its own requirement; it keeps only the surviving
/// children. Sibling order is preserved.
pub fn filter_menu(tree: &[MenuNode], granted: &[Permission]) -> Vec<MenuNode> {
    tree.iter().filter_map(|node| filter_node(node, granted)).collect()
}

fn filter_node(node: &MenuNode, granted: &[Permission]) -> Option<MenuNode> {
    if node.is_leaf() {
        return is_granted(node.required_permission.as_ref(), granted).then(|| node.clone());
    }

    let children = filter_menu(&node.children, granted);
    if children.is_empty() {
        return None;
    }

    Some(MenuNode {
        id: node.id.clone(),
        title: node.title.clone(),
        path: node.path.clone(),
        icon: node.icon.clone(),
        required_permission: node.required_permission.clone(),
        children,
    })
}

/// Root-to-node chain for the first node whose path is `path`.
///
/// Empty if no node matches.
pub fn breadcrumbs_for(tree: &[MenuNode], path: &str) -> Vec<MenuNode> {
    let mut trail = Vec::new();
    if collect_trail(tree, path, &mut trail) {
        trail.into_iter().cloned().collect()
    } else {
        Vec::new()
    }
}

fn collect_trail<'a>(nodes: &'a [MenuNode], path: &str, trail: &mut Vec<&'a MenuNode>) -> bool {
    for node in nodes {
        trail.push(node);
        if node.matches_path(path) || collect_trail(&node.children, path, trail) {
            return true;
        }
        trail.pop();
    }
    false
}

/// First node in pre-order whose path is `path`.
///
/// Paths are expected to be unique but nothing enforces it; on duplicates the
/// first one encountered wins.
pub fn find_by_path<'a>(tree: &'a [MenuNode], path: &str) -> Option<&'a MenuNode> {
    for node in tree {
        if node.matches_path(path) {
            return Some(node);
        }
        if let Some(found) = find_by_path(&node.children, path) {
            return Some(found);
        }
    }
    None
}

/// Every node in pre-order.
pub fn flatten(tree: &[MenuNode]) -> Vec<&MenuNode> {
    let mut out = Vec::new();
    let mut stack: Vec<&MenuNode> = tree.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(node.children.iter().rev());
    }
    out
}
