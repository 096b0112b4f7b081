//! The error slice of a message view: one error icon, and a retry banner.
//!
//! Only the first error (in arrival order) is drawn as an icon, however many
//! there are. The retry banner appears if *any* error is network-class, and
//! retrying resends once to every distinct recipient with a replayable error.

use indexmap::IndexSet;
use serde_json::json;

use crate::{
    cx::Cx,
    dom::NodeId,
    error::ViewError,
    markup::{el, Markup, TemplateId},
    model::{DeliveryError, Message},
};

const ICON_CONTAINER: &str = "error-icon-container";
const RETRY_BANNER: &str = "hasRetry";

pub struct ErrorAggregator;

impl ErrorAggregator {
    /// Brings the error icon and retry banner under `root` in line with `message.errors`.
    ///
    /// Stale icons and banners are always removed before fresh ones are
    /// added, so calling this any number of times leaves at most one of each.
    /// The banner is updated even if the icon cannot be; the first failure is
    /// returned once both have run.
    pub fn update(cx: &mut Cx, root: NodeId, message: &Message) -> Result<(), ViewError> {
        let icon = Self::update_icon(cx, root, message);
        let banner = Self::update_banner(cx, root, message);
        icon.and(banner)
    }

    fn update_icon(cx: &mut Cx, root: NodeId, message: &Message) -> Result<(), ViewError> {
        for stale in cx.tree.find_all_by_class(root, ICON_CONTAINER) {
            cx.tree.remove(stale);
        }
        let Some(first) = message.errors.first() else { return Ok(()) };
        if message.is_incoming() {
            let description = message.description(cx.localizer());
            let content = cx.tree
                .find_by_class(root, "content")
                .ok_or(ViewError::MissingRole("content"))?;
            cx.tree.set_text(content, description)?;
            cx.tree.add_class(content, "error-message")?;
        }
        let bubble = cx.tree
            .find_by_class(root, "bubble")
            .ok_or(ViewError::MissingRole("bubble"))?;
        let icon = Self::render_icon(cx, first);
        let icon = cx.tree.build(&icon);
        cx.tree.append_child(bubble, icon)?;
        Ok(())
    }

    fn update_banner(cx: &mut Cx, root: NodeId, message: &Message) -> Result<(), ViewError> {
        for stale in cx.tree.find_all_by_class(root, RETRY_BANNER) {
            cx.tree.remove(stale);
        }
        if !message.has_network_error() {
            return Ok(());
        }
        let meta = cx.tree
            .find_by_class(root, "meta")
            .ok_or(ViewError::MissingRole("meta"))?;
        let data = json!({
            "messageNotSent": cx.t("messageNotSent", &[]),
            "resend": cx.t("resend", &[]),
        });
        let banner = el("span")
            .class(RETRY_BANNER)
            .children(cx.render_template(TemplateId::RetryBanner, &data));
        let banner = cx.tree.build(&Markup::from(banner));
        cx.tree.prepend_child(meta, banner)?;
        Ok(())
    }

    fn render_icon(cx: &Cx, error: &DeliveryError) -> Markup {
        let title = if !error.message.is_empty() {
            error.message.clone()
        } else if error.is_unregistered_user() {
            cx.t("unregisteredUser", &[])
        } else {
            cx.t("sendFailed", &[])
        };
        el("div")
            .class(ICON_CONTAINER)
            .class_if(error.is_unregistered_user(), "unregistered-user-error")
            .children(cx.render_template(TemplateId::ErrorIcon, &json!({ "title": title })))
            .into()
    }

    /// The recipients to resend to: one per distinct recipient of a
    /// replayable error, in the order their first such error arrived.
    pub fn retry_targets(message: &Message) -> Vec<String> {
        message.errors
            .iter()
            .filter(|e| message.is_replayable_error(e))
            .map(|e| e.recipient.clone())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use crate::{
        cx::ManualClock,
        markup::{DefaultTemplates, TemplateRenderer},
        model::{DeliveryErrorKind, MessageType},
    };

    fn setup(message_type: MessageType) -> (Cx, NodeId, Message) {
        let mut cx = Cx::new(ManualClock::default());
        let root = cx.tree.create_element("li");
        let fragment = DefaultTemplates.render(TemplateId::Message, &Value::Null);
        cx.tree.replace_children(root, &fragment).unwrap();
        let mut message = Message::new("m1", message_type);
        message.body = Some("hello".into());
        (cx, root, message)
    }

    fn other(recipient: &str, replayable: bool) -> DeliveryError {
        DeliveryError::new(DeliveryErrorKind::Other, recipient, replayable)
    }

    fn icons(cx: &Cx, root: NodeId) -> Vec<NodeId> {
        cx.tree.find_all_by_class(root, ICON_CONTAINER)
    }

    fn banners(cx: &Cx, root: NodeId) -> usize {
        cx.tree.find_all_by_class(root, RETRY_BANNER).len()
    }

    #[test]
    fn icon_count_is_zero_or_one() {
        let (mut cx, root, mut message) = setup(MessageType::Outgoing);
        for n in 0..5 {
            message.errors = (0..n).map(|i| other(&format!("+{i}"), false)).collect();
            ErrorAggregator::update(&mut cx, root, &message).unwrap();
            ErrorAggregator::update(&mut cx, root, &message).unwrap();
            assert_eq!(icons(&cx, root).len(), if n == 0 { 0 } else { 1 });
        }
    }

    #[test]
    fn banner_iff_any_network_error() {
        let (mut cx, root, mut message) = setup(MessageType::Outgoing);
        message.errors = vec![other("+1", true), other("+2", false)];
        ErrorAggregator::update(&mut cx, root, &message).unwrap();
        assert_eq!(banners(&cx, root), 0);

        message.errors.push(DeliveryError::network("+3"));
        ErrorAggregator::update(&mut cx, root, &message).unwrap();
        ErrorAggregator::update(&mut cx, root, &message).unwrap();
        assert_eq!(banners(&cx, root), 1);
        let meta = cx.tree.find_by_class(root, "meta").unwrap();
        let banner = cx.tree.children(meta)[0];
        assert!(cx.tree.has_class(banner, RETRY_BANNER));
        assert_eq!(cx.tree.text_content(banner), "Message not sent. Resend");

        message.errors.clear();
        ErrorAggregator::update(&mut cx, root, &message).unwrap();
        assert_eq!(banners(&cx, root), 0);
        assert!(icons(&cx, root).is_empty());
    }

    #[test]
    fn icon_reflects_first_error_even_when_a_later_one_is_network() {
        let (mut cx, root, mut message) = setup(MessageType::Incoming);
        message.errors = vec![
            DeliveryError::unregistered("+1").with_message("Not registered"),
            DeliveryError::network("+2"),
        ];
        ErrorAggregator::update(&mut cx, root, &message).unwrap();

        let icons = icons(&cx, root);
        assert_eq!(icons.len(), 1);
        assert!(cx.tree.has_class(icons[0], "unregistered-user-error"));
        let inner = cx.tree.find_by_class(icons[0], "error-icon").unwrap();
        assert_eq!(cx.tree.attr(inner, "title"), Some("Not registered"));
        assert_eq!(banners(&cx, root), 1);

        let content = cx.tree.find_by_class(root, "content").unwrap();
        assert!(cx.tree.has_class(content, "error-message"));
        assert_eq!(cx.tree.text_content(content), "Error handling incoming message.");
    }

    #[test]
    fn outgoing_errors_keep_the_body() {
        let (mut cx, root, mut message) = setup(MessageType::Outgoing);
        message.errors = vec![DeliveryError::network("+1")];
        ErrorAggregator::update(&mut cx, root, &message).unwrap();
        let content = cx.tree.find_by_class(root, "content").unwrap();
        assert!(!cx.tree.has_class(content, "error-message"));
    }

    #[test]
    fn retry_targets_are_distinct_replayable_recipients() {
        let (_cx, _root, mut message) = setup(MessageType::Outgoing);
        message.errors = vec![
            other("+1", false),
            DeliveryError::network("+2"),
            other("+3", false),
            DeliveryError::network("+2"),
            DeliveryError::unregistered("+4"),
            other("+1", false),
            other("+5", true),
        ];
        assert_eq!(ErrorAggregator::retry_targets(&message), vec!["+2", "+4", "+5"]);
    }

    #[test]
    fn missing_bubble_is_reported() {
        let mut cx = Cx::new(ManualClock::default());
        let root = cx.tree.create_element("li");
        let mut message = Message::new("m1", MessageType::Outgoing);
        message.errors.push(other("+1", false));
        assert_eq!(
            ErrorAggregator::update(&mut cx, root, &message),
            Err(ViewError::MissingRole("bubble")),
        );
    }

    #[test]
    fn banner_is_drawn_without_a_bubble() {
        let mut cx = Cx::new(ManualClock::default());
        let root = cx.tree.build(&Markup::from(el("li").child(el("div").class("meta"))));
        let mut message = Message::new("m1", MessageType::Outgoing);
        message.errors.push(DeliveryError::network("+1"));
        assert_eq!(
            ErrorAggregator::update(&mut cx, root, &message),
            Err(ViewError::MissingRole("bubble")),
        );
        assert_eq!(banners(&cx, root), 1);
        assert!(icons(&cx, root).is_empty());
    }
}
