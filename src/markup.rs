//! Typed markup fragments and the templates that produce them.
//!
//! A template is a pure function from a [`TemplateId`] and a JSON data object
//! to a [`Fragment`]. The [`ViewTree`](crate::dom::ViewTree) turns fragments
//! into live nodes; nothing here touches the tree.

use serde_json::Value;

/// A single node of markup: either an element with children, or a run of text.
#[derive(Debug, Clone, PartialEq)]
pub enum Markup {
    Element(ElementMarkup),
    Text(String),
}

/// An ordered list of sibling markup nodes.
pub type Fragment = Vec<Markup>;

/// An element description, built with the chained helpers below.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementMarkup {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: Vec<(String, String)>,
    pub styles: Vec<(String, String)>,
    pub children: Vec<Markup>,
}

impl ElementMarkup {
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Adds `class` only if `condition` holds.
    pub fn class_if(self, condition: bool, class: impl Into<String>) -> Self {
        if condition { self.class(class) } else { self }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: impl Into<Markup>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Markup>) -> Self {
        self.children.extend(children);
        self
    }

    /// Appends a text child. Empty strings are skipped.
    pub fn text(self, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() { self } else { self.child(Markup::Text(text)) }
    }
}

impl From<ElementMarkup> for Markup {
    fn from(element: ElementMarkup) -> Self {
        Markup::Element(element)
    }
}

/// Starts an element description with the given tag name.
pub fn el(tag: impl Into<String>) -> ElementMarkup {
    ElementMarkup { tag: tag.into(), ..Default::default() }
}

/// A text markup node.
pub fn text(text: impl Into<String>) -> Markup {
    Markup::Text(text.into())
}


/// The templates a message view knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    /// The full content of a message bubble.
    Message,
    /// The icon shown in the bubble when the message has delivery errors.
    ErrorIcon,
    /// The "message not sent, resend" banner shown for network errors.
    RetryBanner,
    /// The hourglass drawn inside `.timer` for expiring messages.
    Hourglass,
    /// A contact's avatar, either an image or their initial.
    Avatar,
    /// The placeholder shown for an attachment until its content resolves.
    AttachmentPlaceholder,
    /// The advisory line announcing a change to the disappearing-messages timer.
    ExpirationTimerUpdate,
    /// The advisory line announcing a contact's safety number changed.
    KeyChange,
}

/// Renders a template into markup. Implementations must be free of side effects.
pub trait TemplateRenderer {
    fn render(&self, template: TemplateId, data: &Value) -> Fragment;
}

/// The built-in templates.
///
/// Every field read from `data` is optional; a missing field renders as an
/// empty slice rather than failing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTemplates;

fn str_field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

impl DefaultTemplates {
    fn avatar(data: &Value) -> Markup {
        let Some(avatar) = data.get("avatar").filter(|a| !a.is_null()) else {
            return el("span").class("avatar").into();
        };
        let color = str_field(avatar, "color");
        match avatar.get("url").and_then(Value::as_str) {
            Some(url) => el("span")
                .class("avatar")
                .style("background-image", format!("url('{url}')"))
                .into(),
            None => el("span")
                .class("avatar")
                .class_if(!color.is_empty(), color)
                .text(str_field(avatar, "content"))
                .into(),
        }
    }

    fn message(data: &Value) -> Fragment {
        let sender = str_field(data, "sender");
        let mut fragment = Vec::with_capacity(2);
        if data.get("avatar").is_some_and(|a| !a.is_null()) {
            fragment.push(Self::avatar(data));
        }
        fragment.push(
            el("div")
                .class("bubble")
                .child(el("div").class("sender").attr("dir", "auto").text(sender))
                .child(el("div").class("attachments"))
                .child(
                    el("p").class("content").attr("dir", "auto")
                        .child(el("span").class("body").text(str_field(data, "message")))
                )
                .child(
                    el("div")
                        .class("meta")
                        .child(
                            el("span")
                                .class("timestamp")
                                .attr("data-timestamp", data.get("timestamp").map(Value::to_string).unwrap_or_default())
                        )
                        .child(el("span").class("status"))
                        .child(el("span").class("timer"))
                )
                .into(),
        );
        fragment
    }
}

impl TemplateRenderer for DefaultTemplates {
    fn render(&self, template: TemplateId, data: &Value) -> Fragment {
        match template {
            TemplateId::Message => Self::message(data),
            TemplateId::ErrorIcon => vec![
                el("span").class("error-icon").attr("title", str_field(data, "title")).into(),
            ],
            TemplateId::RetryBanner => vec![
                text(format!("{} ", str_field(data, "messageNotSent"))),
                el("span").class("retry").text(str_field(data, "resend")).into(),
            ],
            TemplateId::Hourglass => vec![
                el("div").class("hourglass").child(el("span").class("sand")).into(),
            ],
            TemplateId::Avatar => vec![Self::avatar(data)],
            TemplateId::AttachmentPlaceholder => vec![
                el("span")
                    .class("attachment-placeholder")
                    .text(str_field(data, "fileName"))
                    .text(str_field(data, "size"))
                    .into(),
            ],
            TemplateId::ExpirationTimerUpdate => vec![
                el("div")
                    .class("content")
                    .child(el("span").class("icon").class("clock"))
                    .text(str_field(data, "content"))
                    .into(),
            ],
            TemplateId::KeyChange => vec![
                el("div")
                    .class("content")
                    .child(el("span").class("shield").class("icon"))
                    .text(str_field(data, "content"))
                    .into(),
            ],
        }
    }
}
