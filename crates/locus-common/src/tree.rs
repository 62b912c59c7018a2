//! Immutable UI hierarchy snapshot.
//!
//! Nodes live in a single arena owned by [`UiTree`]. Children and parents are
//! referenced by [`NodeId`] so the whole snapshot drops as one value when the
//! next dump replaces it.

use crate::bounds::{Bounds, is_hidden_bounds};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiNode {
    pub tag: String,
    /// Attributes in dump order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl UiNode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, treating empty strings as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.attr(key).filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &str) -> bool {
        self.attr(key) == Some("true")
    }

    pub fn text(&self) -> &str {
        self.attr("text").unwrap_or("")
    }

    pub fn content_desc(&self) -> &str {
        self.attr("content-desc").unwrap_or("")
    }

    pub fn resource_id(&self) -> &str {
        self.attr("resource-id").unwrap_or("")
    }

    pub fn class(&self) -> &str {
        self.attr("class").unwrap_or("")
    }

    pub fn bounds_str(&self) -> Option<&str> {
        self.attr("bounds")
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds_str().and_then(Bounds::parse)
    }

    /// The dumper's `index` attribute (position among siblings).
    pub fn index_attr(&self) -> Option<i64> {
        self.attr("index").and_then(|v| v.trim().parse().ok())
    }

    pub fn is_clickable(&self) -> bool {
        self.flag("clickable")
    }

    pub fn is_enabled(&self) -> bool {
        self.flag("enabled")
    }

    pub fn is_selected(&self) -> bool {
        self.flag("selected")
    }

    pub fn is_scrollable(&self) -> bool {
        self.flag("scrollable")
    }

    /// Zero-area node the dumper reports as `[0,0][0,0]`.
    pub fn is_hidden(&self) -> bool {
        is_hidden_bounds(self.bounds_str())
    }

    /// Last segment of a class name (`android.widget.TextView` -> `TextView`).
    pub fn short_class(&self) -> &str {
        let class = self.class();
        class.rsplit('.').next().unwrap_or(class)
    }
}

#[derive(Debug, Clone)]
pub struct UiTree {
    nodes: Vec<UiNode>,
    root: NodeId,
    order: Vec<NodeId>,
    position: Vec<usize>,
}

impl UiTree {
    pub fn builder(root_tag: &str) -> UiTreeBuilder {
        UiTreeBuilder::new(root_tag)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &UiNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&UiNode> {
        self.nodes.get(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Pre-order traversal starting at the root.
    pub fn document_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Position of `id` in [`Self::document_order`].
    pub fn position(&self, id: NodeId) -> usize {
        self.position[id.0]
    }

    /// Nodes other than the synthetic root, in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied().filter(move |id| *id != self.root)
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// All descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Other children of the same parent, in order.
    pub fn siblings(&self, id: NodeId) -> Vec<NodeId> {
        match self.parent(id) {
            Some(parent) => self
                .children(parent)
                .iter()
                .copied()
                .filter(|s| *s != id)
                .collect(),
            None => vec![],
        }
    }

    /// Zero-based position among the parent's children.
    pub fn child_position(&self, id: NodeId) -> usize {
        self.parent(id)
            .and_then(|p| self.children(p).iter().position(|c| *c == id))
            .unwrap_or(0)
    }

    /// Screen extent, taken as the widest valid bounds in the snapshot.
    pub fn screen_bounds(&self) -> Option<Bounds> {
        self.nodes
            .iter()
            .filter_map(|n| n.bounds())
            .filter(|b| b.is_valid())
            .max_by_key(|b| b.area())
    }
}

pub struct Ancestors<'a> {
    tree: &'a UiTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

/// Incremental construction of a [`UiTree`]. Nodes may be added in any order
/// as long as the parent already exists; document order is derived on build.
pub struct UiTreeBuilder {
    nodes: Vec<UiNode>,
}

impl UiTreeBuilder {
    pub fn new(root_tag: &str) -> Self {
        Self {
            nodes: vec![UiNode {
                tag: root_tag.to_string(),
                ..UiNode::default()
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a child under `parent` and return its id.
    pub fn push(
        &mut self,
        parent: NodeId,
        tag: &str,
        attributes: Vec<(String, String)>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(UiNode {
            tag: tag.to_string(),
            attributes,
            children: vec![],
            parent: Some(parent),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Shorthand for `push` with `&str` pairs.
    pub fn node(&mut self, parent: NodeId, attributes: &[(&str, &str)]) -> NodeId {
        let attrs = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.push(parent, "node", attrs)
    }

    pub fn set_root_attributes(&mut self, attributes: Vec<(String, String)>) {
        self.nodes[0].attributes = attributes;
    }

    pub fn build(self) -> UiTree {
        let root = NodeId(0);
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }

        let mut position = vec![usize::MAX; self.nodes.len()];
        for (pos, id) in order.iter().enumerate() {
            position[id.0] = pos;
        }

        UiTree {
            nodes: self.nodes,
            root,
            order,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (UiTree, NodeId, NodeId, NodeId) {
        let mut b = UiTree::builder("hierarchy");
        let frame = b.node(
            b.root(),
            &[("class", "android.widget.FrameLayout"), ("bounds", "[0,0][1080,2400]")],
        );
        let button = b.node(
            frame,
            &[
                ("class", "android.widget.Button"),
                ("text", "OK"),
                ("clickable", "true"),
                ("bounds", "[10,10][200,100]"),
            ],
        );
        let label = b.node(button, &[("class", "android.widget.TextView"), ("text", "OK")]);
        (b.build(), frame, button, label)
    }

    #[test]
    fn test_document_order_is_preorder() {
        let (tree, frame, button, label) = sample();
        assert_eq!(
            tree.document_order(),
            &[tree.root(), frame, button, label]
        );
        assert_eq!(tree.position(label), 3);
    }

    #[test]
    fn test_parent_links_and_depth() {
        let (tree, frame, button, label) = sample();
        assert_eq!(tree.parent(label), Some(button));
        assert_eq!(tree.ancestors(label).collect::<Vec<_>>(), vec![button, frame, tree.root()]);
        assert_eq!(tree.depth(label), 3);
    }

    #[test]
    fn test_attribute_accessors() {
        let (tree, _, button, label) = sample();
        let node = tree.node(button);
        assert!(node.is_clickable());
        assert_eq!(node.short_class(), "Button");
        assert_eq!(node.bounds().unwrap().center(), (105, 55));
        assert!(!tree.node(label).is_clickable());
        assert!(tree.node(label).bounds().is_none());
    }

    #[test]
    fn test_screen_bounds_uses_widest_node() {
        let (tree, ..) = sample();
        assert_eq!(tree.screen_bounds(), Some(Bounds::new(0, 0, 1080, 2400)));
    }
}
