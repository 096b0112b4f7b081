//! Error types for the message view.
//!
//! None of these ever escape a [`MessageView`](crate::view::message::MessageView):
//! the view logs them and degrades, so that one broken message never
//! prevents the rest of the thread from rendering.

use thiserror::Error;

use crate::dom::NodeId;

/// Failures of structural operations on the [`ViewTree`](crate::dom::ViewTree).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The node was freed, or never existed in this tree.
    #[error("node {0} is not present in the view tree")]
    NodeNotFound(NodeId),
    /// Text nodes cannot have children, classes, or attributes.
    #[error("node {0} is a text node, not an element")]
    NotAnElement(NodeId),
    /// Appending `child` under `parent` would make a node its own ancestor.
    #[error("cannot append {child} under its own descendant {parent}")]
    WouldCycle { parent: NodeId, child: NodeId },
}

/// Failures while updating one slice of a message view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// A slice the update expected (e.g., `.bubble`) is missing from the current root.
    #[error("no element with role `.{0}` under the message root")]
    MissingRole(&'static str),
    /// The view was already removed from the tree.
    #[error("the message view has already been removed")]
    Removed,
}

/// Failures while loading a [`MessageViewConfig`](crate::config::MessageViewConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse message view config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid message view config: {0}")]
    Invalid(String),
}
