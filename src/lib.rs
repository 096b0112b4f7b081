//! A single chat message view, kept in sync with a message entity whose
//! state changes asynchronously.

/// The owned element tree that views render into.
pub mod dom;
/// Typed markup and the templates that produce it.
pub mod markup;
/// The view context: clock, timers, actions, and injected collaborators.
pub mod cx;
pub mod config;
pub mod error;
pub mod i18n;
/// Emoji and link post-processing of rendered text.
pub mod text;
pub mod logging;

/// The observed message, contact, and attachment entities.
pub mod model;
/// The message view and its sub-components.
pub mod view;

pub use cx::{Cx, Event, MessageViewAction};
pub use view::MessageView;
