// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The data flow arena.
//!
//! Nodes live in a [`Dataflow`] and are addressed by [`NodeId`]. Each node has at most one
//! parent and an ordered list of children, so the graph is a forest rooted at data sources.
//! All link edits go through the arena so `parent`/`children` stay symmetric; [`check_links`]
//! verifies that.
//!
//! [`check_links`]: Dataflow::check_links

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::error::{CompileError, Warning};
use crate::nodes::NodeKind;

/// Stable identifier of a node within one [`Dataflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity used to detect duplicate nodes.
///
/// Structural nodes (sources, generators, outputs, facets) are only ever equal to themselves.
/// Transform nodes compare by content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeHash {
    /// Identity of a structural node.
    Unique(NodeId),
    /// Kind tag plus canonical payload of a transform node.
    Content(String),
}

/// A node and its links.
#[derive(Debug, Clone)]
pub struct Node {
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 2]>,
    kind: NodeKind,
    debug_name: Option<String>,
    explicit: bool,
    hash: Option<NodeHash>,
}

impl Node {
    /// Parent, if any.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The operation.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Debug label.
    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    /// True for nodes created from a view's explicit `transform` entries.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }
}

/// A forest of data flow nodes.
#[derive(Debug, Clone, Default)]
pub struct Dataflow {
    nodes: Vec<Option<Node>>,
    warnings: Vec<Warning>,
}

impl Dataflow {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unlinked node.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Some(Node {
            parent: None,
            children: SmallVec::new(),
            kind,
            debug_name: None,
            explicit: false,
            hash: None,
        }));
        id
    }

    /// Adds a node as the last child of `parent` (or as a root).
    pub fn add_under(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = self.add(kind);
        if let Some(parent) = parent {
            self.set_parent(id, parent);
        }
        id
    }

    /// The node, if it has not been removed.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    fn node(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {id:?} was removed"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("node {id:?} was removed"),
        }
    }

    /// True while the node has not been removed.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// The operation of a node.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// Mutable access to a node's operation. Invalidates its memoized hash.
    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        let node = self.node_mut(id);
        node.hash = None;
        &mut node.kind
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children of a node, in order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Number of children.
    pub fn num_children(&self, id: NodeId) -> usize {
        self.node(id).children.len()
    }

    /// Sets the debug label.
    pub fn set_debug_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.node_mut(id).debug_name = Some(name.into());
    }

    /// Marks a node as coming from an explicit transform.
    pub fn set_explicit(&mut self, id: NodeId, explicit: bool) {
        self.node_mut(id).explicit = explicit;
    }

    /// True for explicit transform nodes.
    pub fn is_explicit(&self, id: NodeId) -> bool {
        self.node(id).explicit
    }

    /// Label used in logs, e.g. `Aggregate#12`.
    pub fn label(&self, id: NodeId) -> String {
        let node = self.node(id);
        match &node.debug_name {
            Some(name) => format!("{}#{}({name})", node.kind.name(), id.0),
            None => format!("{}#{}", node.kind.name(), id.0),
        }
    }

    /// Live nodes without a parent, in creation order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.ids().filter(|&id| self.node(id).parent.is_none()).collect()
    }

    /// Live nodes without children, in creation order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.ids().filter(|&id| self.node(id).children.is_empty()).collect()
    }

    /// All live nodes, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId(u32::try_from(i).unwrap_or(u32::MAX)))
    }

    /// Hands over the link warnings recorded since the last call.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        core::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, warning: Warning) {
        tracing::warn!(%warning, "data flow link");
        self.warnings.push(warning);
    }

    /// Links `id` under `parent` as its last child.
    ///
    /// Does not unlink `id` from a previous parent.
    pub fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        self.node_mut(id).parent = Some(parent);
        self.add_child(parent, id, None);
    }

    /// Adds `child` to the children of `parent`, at `index` or at the end.
    ///
    /// Adding a child twice records [`Warning::DuplicateChild`] and leaves the list unchanged.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        let node = self.node_mut(parent);
        if node.children.contains(&child) {
            self.warn(Warning::DuplicateChild);
            return;
        }
        match index {
            Some(i) if i <= node.children.len() => node.children.insert(i, child),
            _ => node.children.push(child),
        }
    }

    /// Unlinks `child` from `parent` and returns the index it had.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Option<usize> {
        let node = self.node_mut(parent);
        let index = node.children.iter().position(|&c| c == child)?;
        node.children.remove(index);
        if let Some(c) = self.nodes.get_mut(child.index()).and_then(Option::as_mut)
            && c.parent == Some(parent)
        {
            c.parent = None;
        }
        Some(index)
    }

    /// Splices a node out, moving its children into its slot in order, and frees it.
    pub fn remove(&mut self, id: NodeId) {
        let parent = self.node(id).parent;
        let children = core::mem::take(&mut self.node_mut(id).children);
        let mut slot = parent.and_then(|p| self.remove_child(p, id));
        for child in children {
            self.node_mut(child).parent = parent;
            if let Some(p) = parent {
                self.add_child(p, child, slot);
                slot = slot.map(|s| s + 1);
            }
        }
        self.nodes[id.index()] = None;
    }

    /// Puts `id` in the slot of `other` and `other` under `id`.
    pub fn insert_as_parent_of(&mut self, id: NodeId, other: NodeId) {
        if let Some(old) = self.node(id).parent {
            self.remove_child(old, id);
        }
        let parent = self.node(other).parent;
        if let Some(p) = parent {
            let index = self.remove_child(p, other);
            self.node_mut(id).parent = Some(p);
            self.add_child(p, id, index);
        }
        self.set_parent(other, id);
    }

    /// Exchanges the positions of a node and its parent.
    ///
    /// The node's children move to the parent, the node takes the parent's slot in the
    /// grandparent, and the parent (with its remaining children) becomes the node's only child.
    pub fn swap_with_parent(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        let grandparent = self.node(parent).parent;

        let children = core::mem::take(&mut self.node_mut(id).children);
        for child in children {
            self.set_parent(child, parent);
        }
        self.remove_child(parent, id);

        let index = grandparent.and_then(|g| self.remove_child(g, parent));
        self.node_mut(id).parent = grandparent;
        if let Some(g) = grandparent {
            self.add_child(g, id, index);
        }
        self.set_parent(parent, id);
    }

    /// Adds an unlinked copy of a node.
    pub fn clone_node(&mut self, id: NodeId) -> Result<NodeId, CompileError> {
        let node = self.node(id);
        let kind = node.kind.try_clone()?;
        let explicit = node.explicit;
        let debug_name = node.debug_name.as_ref().map(|n| format!("clone_{n}"));
        let copy = self.add(kind);
        let copied = self.node_mut(copy);
        copied.explicit = explicit;
        copied.debug_name = debug_name;
        Ok(copy)
    }

    /// Memoized identity of a node.
    pub fn hash(&mut self, id: NodeId) -> NodeHash {
        let node = self.node_mut(id);
        if let Some(hash) = &node.hash {
            return hash.clone();
        }
        let hash = match node.kind.hash_content() {
            Some(content) => NodeHash::Content(content),
            None => NodeHash::Unique(id),
        };
        node.hash = Some(hash.clone());
        hash
    }

    /// Verifies that every child points back at its parent and that every link targets a live
    /// node. Problems are recorded as [`Warning::InconsistentTree`].
    pub fn check_links(&mut self) -> bool {
        let mut problems = Vec::new();
        for id in self.ids() {
            let node = self.node(id);
            for &child in node.children.iter() {
                match self.get(child) {
                    None => problems.push(format!("{id:?} has removed child {child:?}")),
                    Some(c) if c.parent != Some(id) => {
                        problems.push(format!("{child:?} does not point back at {id:?}"));
                    }
                    Some(_) => {}
                }
            }
            if let Some(parent) = node.parent {
                match self.get(parent) {
                    None => problems.push(format!("{id:?} has removed parent {parent:?}")),
                    Some(p) if !p.children.contains(&id) => {
                        problems.push(format!("{parent:?} does not list child {id:?}"));
                    }
                    Some(_) => {}
                }
            }
        }
        let ok = problems.is_empty();
        for detail in problems {
            self.warn(Warning::InconsistentTree { detail });
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::string::ToString;
    use alloc::vec;

    use super::*;
    use crate::nodes::{CalculateNode, OutputNode, SourceNode};

    fn calc(name: &str) -> NodeKind {
        NodeKind::Calculate(CalculateNode::new("1".to_string(), name.to_string()))
    }

    fn chain(flow: &mut Dataflow, names: &[&str]) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut prev = None;
        for n in names {
            let id = flow.add_under(prev, calc(n));
            ids.push(id);
            prev = Some(id);
        }
        ids
    }

    #[test]
    fn remove_reparents_children_in_place() {
        let mut flow = Dataflow::new();
        let root = flow.add(calc("root"));
        let a = flow.add_under(Some(root), calc("a"));
        let b = flow.add_under(Some(root), calc("b"));
        let c = flow.add_under(Some(root), calc("c"));
        let b1 = flow.add_under(Some(b), calc("b1"));
        let b2 = flow.add_under(Some(b), calc("b2"));

        flow.remove(b);
        assert_eq!(flow.children(root), [a, b1, b2, c]);
        assert_eq!(flow.parent(b1), Some(root));
        assert!(!flow.contains(b));
        assert!(flow.check_links());
    }

    #[test]
    fn insert_as_parent_takes_the_slot() {
        let mut flow = Dataflow::new();
        let root = flow.add(calc("root"));
        let a = flow.add_under(Some(root), calc("a"));
        let b = flow.add_under(Some(root), calc("b"));
        let x = flow.add(calc("x"));

        flow.insert_as_parent_of(x, a);
        assert_eq!(flow.children(root), [x, b]);
        assert_eq!(flow.children(x), [a]);
        assert!(flow.check_links());
    }

    #[test]
    fn swap_with_parent_exchanges_positions() {
        let mut flow = Dataflow::new();
        let ids = chain(&mut flow, &["g", "p", "n", "leaf"]);
        let (g, p, n, leaf) = (ids[0], ids[1], ids[2], ids[3]);
        let sibling = flow.add_under(Some(p), calc("s"));

        flow.swap_with_parent(n);
        assert_eq!(flow.children(g), [n]);
        assert_eq!(flow.children(n), [p]);
        assert_eq!(flow.children(p), [sibling, leaf]);
        assert!(flow.check_links());
    }

    #[test]
    fn duplicate_child_is_a_warning() {
        let mut flow = Dataflow::new();
        let ids = chain(&mut flow, &["a", "b"]);
        flow.add_child(ids[0], ids[1], None);
        assert_eq!(flow.children(ids[0]).len(), 1);
        assert_eq!(flow.take_warnings(), vec![Warning::DuplicateChild]);
    }

    #[test]
    fn content_hash_ignores_identity() {
        let mut flow = Dataflow::new();
        let a = flow.add(calc("x"));
        let b = flow.add(calc("x"));
        let c = flow.add(calc("y"));
        assert_eq!(flow.hash(a), flow.hash(b));
        assert_ne!(flow.hash(a), flow.hash(c));

        let o1 = flow.add(NodeKind::Output(OutputNode::new("main".into(), "main")));
        let o2 = flow.add(NodeKind::Output(OutputNode::new("main".into(), "main")));
        assert_ne!(flow.hash(o1), flow.hash(o2));
    }

    #[test]
    fn sources_refuse_to_clone() {
        let mut flow = Dataflow::new();
        let src = flow.add(NodeKind::Source(SourceNode::named("table".into())));
        assert!(matches!(
            flow.clone_node(src),
            Err(CompileError::Uncloneable { kind: "Source" })
        ));
        let calc = flow.add_under(Some(src), calc("z"));
        let copy = flow.clone_node(calc).unwrap();
        assert_eq!(flow.parent(copy), None);
        assert_eq!(flow.children(src), [calc]);
    }

    #[test]
    fn check_links_reports_asymmetry() {
        let mut flow = Dataflow::new();
        let ids = chain(&mut flow, &["a", "b"]);
        flow.node_mut(ids[1]).parent = None;
        assert!(!flow.check_links());
        assert!(matches!(
            flow.take_warnings().as_slice(),
            [Warning::InconsistentTree { .. }]
        ));
    }
}
