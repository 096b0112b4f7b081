//! An owned element tree standing in for the DOM of the thread view.
//!
//! Nodes live in an arena keyed by [`NodeId`]s that are never reused, so a
//! stale id held across a re-render simply fails to resolve instead of
//! aliasing some newer node. Components are expected to hold onto the root
//! of their view only, and to look up everything else by role (class name)
//! each time they need it.
//!
//! A node can be *pinned*: when an ancestor of a pinned node is freed, the
//! pinned node is detached and kept alive instead of being freed with it.
//! This is how attachment sub-views survive a full re-render of the message
//! that contains them.

use std::{collections::BTreeMap, fmt};

use indexmap::{IndexMap, IndexSet};

use crate::{
    error::TreeError,
    markup::{Markup, ElementMarkup},
};

/// Elements that never have a closing tag when serialized.
const VOID_ELEMENTS: &[&str] = &["br", "img", "hr", "input", "source"];

/// A weak handle to a node in a [`ViewTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// An element's tag, classes, attributes, and inline styles.
#[derive(Debug, Clone, Default, PartialEq)]
struct Element {
    tag: String,
    classes: IndexSet<String>,
    attrs: IndexMap<String, String>,
    styles: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pinned: bool,
}

/// The arena holding every live node.
#[derive(Debug, Default)]
pub struct ViewTree {
    nodes: BTreeMap<NodeId, Node>,
    next_id: u64,
}

impl ViewTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node { kind, parent: None, children: Vec::new(), pinned: false });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes.get_mut(&id).ok_or(TreeError::NodeNotFound(id))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element, TreeError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element(element) => Ok(element),
            NodeKind::Text(_) => Err(TreeError::NotAnElement(id)),
        }
    }

    /// Creates a detached, empty element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element(Element { tag: tag.to_string(), ..Default::default() }))
    }

    /// Creates a detached text node.
    fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    /// Builds detached live nodes from `markup`, returning the top-level node.
    pub fn build(&mut self, markup: &Markup) -> NodeId {
        match markup {
            Markup::Text(text) => self.create_text(text.clone()),
            Markup::Element(ElementMarkup { tag, classes, attrs, styles, children }) => {
                let id = self.alloc(NodeKind::Element(Element {
                    tag: tag.clone(),
                    classes: classes.iter().cloned().collect(),
                    attrs: attrs.iter().cloned().collect(),
                    styles: styles.iter().cloned().collect(),
                }));
                let child_ids: Vec<NodeId> = children.iter().map(|c| self.build(c)).collect();
                for child in &child_ids {
                    if let Some(node) = self.nodes.get_mut(child) {
                        node.parent = Some(id);
                    }
                }
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.children = child_ids;
                }
                id
            }
        }
    }

    /// Builds every node of `fragment`, in order, all detached.
    fn build_fragment(&mut self, fragment: &[Markup]) -> Vec<NodeId> {
        fragment.iter().map(|m| self.build(m)).collect()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or_default()
    }

    fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&id).map(|n| &n.kind)
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    /// Returns `true` if `node` is `ancestor` or lies somewhere beneath it.
    pub fn is_inclusive_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Marks a node so that it survives the freeing of any of its ancestors.
    pub fn pin(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.node_mut(id)?.pinned = true;
        Ok(())
    }

    /// Detaches `id` from its parent, if it has one. The node stays alive.
    pub fn detach(&mut self, id: NodeId) -> Result<(), TreeError> {
        let Some(parent) = self.node_mut(id)?.parent.take() else {
            return Ok(());
        };
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|c| *c != id);
        }
        Ok(())
    }

    fn insert_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<(), TreeError> {
        self.element_mut(parent)?;
        self.node(child)?;
        if self.is_inclusive_descendant(parent, child) {
            return Err(TreeError::WouldCycle { parent, child });
        }
        self.detach(child)?;
        let parent_node = self.node_mut(parent)?;
        match index {
            Some(i) => parent_node.children.insert(i.min(parent_node.children.len()), child),
            None => parent_node.children.push(child),
        }
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Moves `child` to the end of `parent`'s children, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.insert_child(parent, child, None)
    }

    /// Moves `child` to the front of `parent`'s children.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.insert_child(parent, child, Some(0))
    }

    /// Frees `id` and its whole subtree, except for pinned descendants,
    /// which are detached and kept alive. Returns `false` if `id` was not present.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let _ = self.detach(id);
        self.free_subtree(id);
        true
    }

    fn free_subtree(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else { continue };
            if node.pinned && id != root {
                node.parent = None;
                continue;
            }
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
        }
    }

    /// Replaces all children of `parent` with nodes built from `fragment`.
    ///
    /// The new children are fully built before being swapped in, and the old
    /// ones are freed afterwards (pinned ones are only detached).
    pub fn replace_children(&mut self, parent: NodeId, fragment: &[Markup]) -> Result<Vec<NodeId>, TreeError> {
        self.element_mut(parent)?;
        let new_children = self.build_fragment(fragment);
        for child in &new_children {
            self.node_mut(*child)?.parent = Some(parent);
        }
        let old_children = std::mem::replace(&mut self.node_mut(parent)?.children, new_children.clone());
        for old in old_children {
            let Some(node) = self.nodes.get_mut(&old) else { continue };
            node.parent = None;
            if !node.pinned {
                self.free_subtree(old);
            }
        }
        Ok(new_children)
    }

    /// Replaces `old` in its parent with the nodes built from `fragment`, then frees `old`.
    pub fn replace_with_fragment(&mut self, old: NodeId, fragment: &[Markup]) -> Result<Vec<NodeId>, TreeError> {
        self.node(old)?;
        let new_nodes = self.build_fragment(fragment);
        if let Some(parent) = self.parent(old) {
            let index = self.children(parent).iter().position(|c| *c == old).unwrap_or(0);
            for (offset, new) in new_nodes.iter().enumerate() {
                self.insert_child(parent, *new, Some(index + 1 + offset))?;
            }
        }
        self.remove(old);
        Ok(new_nodes)
    }

    /// Replaces the content of an element with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<(), TreeError> {
        self.replace_children(id, &[Markup::Text(text.into())]).map(|_| ())
    }

    /// The text of a text node, or `None` for elements and missing nodes.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// The concatenated text of `id` and all its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else { continue };
            if let NodeKind::Text(text) = &node.kind {
                out.push_str(text);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// All text nodes beneath `root`, in document order.
    pub fn text_nodes(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.text(*id).is_some())
            .collect()
    }

    /// All strict descendants of `root` in document (pre-)order.
    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|e| e.classes.contains(class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), TreeError> {
        self.element_mut(id)?.classes.insert(class.to_string());
        Ok(())
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<(), TreeError> {
        self.element_mut(id)?.classes.shift_remove(class);
        Ok(())
    }

    /// Adds `class` if `on`, removes it otherwise.
    pub fn toggle_class(&mut self, id: NodeId, class: &str, on: bool) -> Result<(), TreeError> {
        if on { self.add_class(id, class) } else { self.remove_class(id, class) }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attrs.get(name)).map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> Result<(), TreeError> {
        self.element_mut(id)?.attrs.insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn style(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.styles.get(name)).map(String::as_str)
    }

    pub fn set_style(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> Result<(), TreeError> {
        self.element_mut(id)?.styles.insert(name.to_string(), value.into());
        Ok(())
    }

    /// The first strict descendant of `root` carrying `class`, in document order.
    pub fn find_by_class(&self, root: NodeId, class: &str) -> Option<NodeId> {
        self.descendants(root).into_iter().find(|id| self.has_class(*id, class))
    }

    /// Every strict descendant of `root` carrying `class`, in document order.
    pub fn find_all_by_class(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.has_class(*id, class))
            .collect()
    }

    /// Walks up from `node` (inclusive) to `boundary` (inclusive) looking for `class`.
    pub fn closest_with_class(&self, node: NodeId, class: &str, boundary: NodeId) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.has_class(id, class) {
                return Some(id);
            }
            if id == boundary {
                return None;
            }
            current = self.parent(id);
        }
        None
    }

    /// Serializes `id` and its subtree as HTML.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else { return };
        let element = match &node.kind {
            NodeKind::Text(text) => {
                out.push_str(&htmlize::escape_text(text.as_str()));
                return;
            }
            NodeKind::Element(element) => element,
        };
        out.push('<');
        out.push_str(&element.tag);
        if !element.classes.is_empty() {
            let classes = element.classes.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
            out.push_str(&format!(" class=\"{}\"", htmlize::escape_attribute(classes.as_str())));
        }
        for (name, value) in &element.attrs {
            out.push_str(&format!(" {name}=\"{}\"", htmlize::escape_attribute(value.as_str())));
        }
        if !element.styles.is_empty() {
            let styles = element.styles.iter()
                .map(|(k, v)| format!("{k}: {v};"))
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&format!(" style=\"{}\"", htmlize::escape_attribute(styles.as_str())));
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&element.tag.as_str()) {
            return;
        }
        for child in &node.children {
            self.write_html(*child, out);
        }
        out.push_str("</");
        out.push_str(&element.tag);
        out.push('>');
    }
}
