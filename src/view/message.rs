//! The view of a single message in a thread.
//!
//! A [`MessageView`] owns one `li` root in the [`ViewTree`](crate::dom::ViewTree)
//! and keeps it in sync with a [`MessageEntity`]. Entity signals are mapped
//! to either a full re-render or a narrow update of one slice of the root
//! (see [`updates_for`]). The sub-components that own a slice (countdown,
//! timestamp, attachments) never cache nodes inside the root, so a full
//! re-render can replace that content at any time.
//!
//! Removal has two triggers once a message expires: the end of the exit
//! animation and a failsafe timer, since animation events are not
//! delivered to backgrounded windows. Whichever comes first removes the
//! view; [`MessageView::remove`] is idempotent so the other is harmless.

use crossbeam_channel::Receiver;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    cx::{Cx, Event, MessageViewAction, Timer},
    dom::NodeId,
    error::ViewError,
    markup::{el, Markup, TemplateId},
    model::{ChangedFields, Contact, Message, MessageEntity, MessageSignal},
    view::{
        attachments::AttachmentReconciler,
        errors::ErrorAggregator,
        expiration::ExpirationScheduler,
        timestamp::TimestampView,
    },
};

const LOG_MESSAGE_SIGNALS: bool = cfg!(feature = "log_message_signals");

/// Clicks on elements with these classes select the message.
const SELECT_TARGETS: &[&str] = &["error-icon", "timestamp", "status", "error-message"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Live,
    /// The message expired and its exit animation is playing.
    /// Nothing but removal happens from here on.
    Expiring,
    /// The root has been removed from the tree.
    Removed,
}

/// One kind of DOM update a change to the message calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// Re-render the whole content and then every slice.
    Full,
    Errors,
    Delivered,
    /// (Re)start the expiration countdown.
    Expiring,
    /// Session-end and group-update rendering.
    Control,
    Sent,
}

/// The updates to apply, in order, for a change to `fields` of a message.
///
/// A body change (or an error change on an incoming message, whose
/// displayed text depends on its errors) calls for a full render, which
/// already covers every partial. Otherwise each changed slice gets its own
/// partial, and any change at all recomputes the sent state.
pub fn updates_for(fields: ChangedFields, incoming: bool) -> Vec<Update> {
    if fields.is_empty() {
        return Vec::new();
    }
    if fields.contains(ChangedFields::BODY) || (incoming && fields.contains(ChangedFields::ERRORS)) {
        return vec![Update::Full];
    }
    let mut updates = Vec::new();
    if fields.contains(ChangedFields::ERRORS) {
        updates.push(Update::Errors);
    }
    if fields.contains(ChangedFields::DELIVERED) {
        updates.push(Update::Delivered);
    }
    if fields.contains(ChangedFields::EXPIRATION_START) {
        updates.push(Update::Expiring);
    }
    if fields.intersects(ChangedFields::FLAGS | ChangedFields::GROUP_UPDATE) {
        updates.push(Update::Control);
    }
    updates.push(Update::Sent);
    updates
}

/// See the module-level docs.
pub struct MessageView {
    entity: MessageEntity,
    signals: Receiver<MessageSignal>,
    root: NodeId,
    lifecycle: Lifecycle,
    /// Created the first time the countdown slice is rendered.
    expiration: Option<ExpirationScheduler>,
    timestamp: TimestampView,
    attachments: AttachmentReconciler,
    failsafe: Timer,
}

impl MessageView {
    /// Subscribes to `entity` and creates an empty root for it.
    /// Call [`MessageView::render`] to fill it in.
    pub fn new(cx: &mut Cx, entity: MessageEntity) -> Self {
        let signals = entity.subscribe();
        let root = {
            let message = entity.get();
            cx.tree.build(&Markup::from(
                el("li")
                    .class("entry")
                    .class(message.message_type.as_str())
                    .attr("id", message.id.as_str())
            ))
        };
        let attachments = AttachmentReconciler::new(entity.id());
        Self {
            entity,
            signals,
            root,
            lifecycle: Lifecycle::Live,
            expiration: None,
            timestamp: TimestampView::new(),
            attachments,
            failsafe: Timer::empty(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn entity(&self) -> &MessageEntity {
        &self.entity
    }

    pub fn attachments(&self) -> &AttachmentReconciler {
        &self.attachments
    }

    fn message_id(&self) -> String {
        self.entity.id()
    }

    fn log_failure(&self, what: &str, result: Result<(), ViewError>) {
        if let Err(e) = result {
            warn!("Failed to update {what} of message {}: {e}", self.message_id());
        }
    }

    /// Renders the whole content of the root from the current message state.
    pub fn render(&mut self, cx: &mut Cx) {
        if self.lifecycle != Lifecycle::Live {
            debug!("Not rendering message {} in state {:?}", self.message_id(), self.lifecycle);
            return;
        }
        let entity = self.entity.clone();
        let message = entity.get();
        let contact = message.sender_contact();
        let data = json!({
            "message": message.body.as_deref().unwrap_or_default(),
            "timestamp": message.sent_at,
            "sender": contact.map(Contact::title).unwrap_or_default(),
            "avatar": contact.map(Contact::avatar),
        });
        let fragment = cx.render_template(TemplateId::Message, &data);
        if let Err(e) = cx.tree.replace_children(self.root, &fragment) {
            warn!("Failed to render message {}: {e}", message.id);
            return;
        }
        // Every attachment node now hangs off a container that no longer exists.
        self.attachments.invalidate_mounts();

        let result = self.timestamp.update(cx, self.root, message.sent_at);
        self.log_failure("timestamp", result);
        let result = self.render_bubble_color(cx, &message);
        self.log_failure("colour", result);
        let result = self.render_control(cx, &message);
        self.log_failure("control", result);
        let result = self.render_body(cx);
        self.log_failure("body", result);
        let result = self.render_sent(cx, &message);
        self.log_failure("sent state", result);
        let result = self.render_delivered(cx, &message);
        self.log_failure("delivered state", result);
        let result = ErrorAggregator::update(cx, self.root, &message);
        self.log_failure("errors", result);
        let result = self.render_expiring(cx, &message);
        self.log_failure("countdown", result);
        let result = self.attachments.load(cx, self.root, &message.attachments);
        self.log_failure("attachments", result);
    }

    fn render_body(&self, cx: &mut Cx) -> Result<(), ViewError> {
        let Some(body) = cx.tree.find_by_class(self.root, "body") else {
            return Ok(());
        };
        cx.apply_emoji(body)?;
        cx.apply_links(body)?;
        Ok(())
    }

    fn render_bubble_color(&self, cx: &mut Cx, message: &Message) -> Result<(), ViewError> {
        let Some(color) = message.sender_contact().and_then(|c| c.color.as_deref()) else {
            return Ok(());
        };
        let bubble = cx.tree
            .find_by_class(self.root, "bubble")
            .ok_or(ViewError::MissingRole("bubble"))?;
        cx.tree.add_class(bubble, color)?;
        Ok(())
    }

    fn render_sent(&self, cx: &mut Cx, message: &Message) -> Result<(), ViewError> {
        if message.is_outgoing() {
            cx.tree.toggle_class(self.root, "sent", message.sent)?;
        }
        Ok(())
    }

    fn render_delivered(&self, cx: &mut Cx, message: &Message) -> Result<(), ViewError> {
        cx.tree.toggle_class(self.root, "delivered", message.delivered)?;
        Ok(())
    }

    fn render_pending(&self, cx: &mut Cx, pending: bool) -> Result<(), ViewError> {
        cx.tree.toggle_class(self.root, "pending", pending)?;
        Ok(())
    }

    fn render_control(&self, cx: &mut Cx, message: &Message) -> Result<(), ViewError> {
        if !(message.is_end_session() || message.is_group_update()) {
            cx.tree.remove_class(self.root, "control")?;
            return Ok(());
        }
        cx.tree.add_class(self.root, "control")?;
        let content = cx.tree
            .find_by_class(self.root, "content")
            .ok_or(ViewError::MissingRole("content"))?;
        let description = message.description(cx.localizer());
        cx.tree.set_text(content, description)?;
        cx.apply_emoji(content)?;
        Ok(())
    }

    fn render_expiring(&mut self, cx: &mut Cx, message: &Message) -> Result<(), ViewError> {
        self.expiration
            .get_or_insert_with(ExpirationScheduler::new)
            .update(cx, self.root, message)?;
        Ok(())
    }

    /// Swaps the bubble's colour class and redraws the avatar after the
    /// sender's colour changed.
    fn update_color(&self, cx: &mut Cx) -> Result<(), ViewError> {
        let entity = self.entity.clone();
        let message = entity.get();
        let Some(contact) = message.sender_contact() else {
            return Ok(());
        };
        let bubble = cx.tree
            .find_by_class(self.root, "bubble")
            .ok_or(ViewError::MissingRole("bubble"))?;
        let palette = cx.config().bubble_colors.clone();
        for color in &palette {
            cx.tree.remove_class(bubble, color)?;
        }
        if let Some(color) = &contact.color {
            cx.tree.add_class(bubble, color)?;
        }
        if let Some(avatar) = cx.tree.find_by_class(self.root, "avatar") {
            let fragment = cx.render_template(TemplateId::Avatar, &json!({ "avatar": contact.avatar() }));
            cx.tree.replace_with_fragment(avatar, &fragment)?;
        }
        Ok(())
    }

    /// Drains and handles every signal the entity has emitted since the last call.
    /// Returns the number of signals handled.
    pub fn process_signals(&mut self, cx: &mut Cx) -> usize {
        let mut handled = 0;
        while let Ok(signal) = self.signals.try_recv() {
            self.handle_signal(cx, signal);
            handled += 1;
        }
        handled
    }

    /// Applies one entity signal. Never fails: errors are logged and the
    /// affected slice is left as it was.
    pub fn handle_signal(&mut self, cx: &mut Cx, signal: MessageSignal) {
        if LOG_MESSAGE_SIGNALS {
            debug!("message {}: {signal:?} ({:?})", self.message_id(), self.lifecycle);
        }
        if self.lifecycle != Lifecycle::Live {
            // Once expiring, the expiry path owns removal, and a removed view does nothing.
            return;
        }
        match signal {
            MessageSignal::Changed(fields) => self.apply_changes(cx, fields),
            MessageSignal::Pending => {
                let result = self.render_pending(cx, true);
                self.log_failure("pending state", result);
            }
            MessageSignal::Done => {
                let result = self.render_pending(cx, false);
                self.log_failure("pending state", result);
            }
            MessageSignal::Expired => self.on_expired(cx),
            MessageSignal::Destroyed => {
                self.remove(cx);
            }
            MessageSignal::ContactColorChanged => {
                let result = self.update_color(cx);
                self.log_failure("colour", result);
            }
        }
    }

    fn apply_changes(&mut self, cx: &mut Cx, fields: ChangedFields) {
        let incoming = self.entity.get().is_incoming();
        let entity = self.entity.clone();
        for update in updates_for(fields, incoming) {
            if update == Update::Full {
                self.render(cx);
                continue;
            }
            let message = entity.get();
            let result = match update {
                Update::Errors => ErrorAggregator::update(cx, self.root, &message),
                Update::Delivered => self.render_delivered(cx, &message),
                Update::Expiring => self.render_expiring(cx, &message),
                Update::Control => self.render_control(cx, &message),
                Update::Sent => self.render_sent(cx, &message),
                Update::Full => Ok(()),
            };
            self.log_failure(&format!("{update:?}"), result);
        }
    }

    fn on_expired(&mut self, cx: &mut Cx) {
        debug!("Message {} expired; playing exit animation", self.message_id());
        let result = cx.tree.add_class(self.root, "expired").map_err(ViewError::from);
        self.log_failure("expired state", result);
        self.lifecycle = Lifecycle::Expiring;
        if let Some(expiration) = &mut self.expiration {
            expiration.cancel(cx);
        }
        self.timestamp.cancel(cx);
        let failsafe = cx.config().expire_failsafe();
        self.failsafe = cx.start_timeout(failsafe);
    }

    /// Removes the root from the tree and releases everything the view holds.
    ///
    /// Returns `false` (and does nothing) if the view was already removed.
    pub fn remove(&mut self, cx: &mut Cx) -> bool {
        if self.lifecycle == Lifecycle::Removed {
            return false;
        }
        cx.stop_timer(self.failsafe);
        self.failsafe = Timer::empty();
        if let Some(expiration) = &mut self.expiration {
            expiration.cancel(cx);
        }
        self.timestamp.cancel(cx);
        self.attachments.release(cx);
        cx.tree.remove(self.root);
        // Drop the subscription; the entity prunes it on its next emit.
        self.signals = crossbeam_channel::never();
        self.lifecycle = Lifecycle::Removed;

        let message_id = self.message_id();
        info!("Removed view of message {message_id}");
        cx.action(MessageViewAction::Removed { message_id });
        true
    }

    /// Handles a host event. Returns `true` if the event was meant for this view.
    pub fn handle_event(&mut self, cx: &mut Cx, event: &Event) -> bool {
        if self.lifecycle == Lifecycle::Removed {
            return false;
        }
        if self.failsafe.is_event(event) {
            debug!("Exit animation of message {} did not finish in time", self.message_id());
            self.failsafe = Timer::empty();
            self.remove(cx);
            return true;
        }
        match event {
            Event::AnimationEnd(node) => {
                let on_bubble = cx.tree.find_by_class(self.root, "bubble") == Some(*node);
                if self.lifecycle == Lifecycle::Expiring && on_bubble {
                    self.remove(cx);
                    return true;
                }
                false
            }
            Event::Timer(_) if self.lifecycle == Lifecycle::Live => {
                if self.expiration.as_ref().is_some_and(|e| e.is_tick(event)) {
                    let entity = self.entity.clone();
                    let result = self.render_expiring(cx, &entity.get());
                    self.log_failure("countdown", result);
                    return true;
                }
                let result = self.timestamp.handle_event(cx, self.root, event);
                match result {
                    Ok(consumed) => consumed,
                    Err(e) => {
                        warn!("Failed to refresh timestamp of message {}: {e}", self.message_id());
                        true
                    }
                }
            }
            Event::Timer(_) => false,
            Event::Click(target) => self.handle_click(cx, *target),
            Event::AttachmentResolved { attachment_id, url } => {
                if self.lifecycle != Lifecycle::Live {
                    return false;
                }
                match self.attachments.resolve(cx, self.root, attachment_id, url) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        warn!("Failed to mount attachment {attachment_id} of message {}: {e}", self.message_id());
                        true
                    }
                }
            }
        }
    }

    fn handle_click(&mut self, cx: &mut Cx, target: NodeId) -> bool {
        if self.lifecycle != Lifecycle::Live || !cx.tree.is_inclusive_descendant(target, self.root) {
            return false;
        }
        if cx.tree.closest_with_class(target, "retry", self.root).is_some() {
            self.retry(cx);
            return true;
        }
        let selected = SELECT_TARGETS
            .iter()
            .any(|class| cx.tree.closest_with_class(target, class, self.root).is_some());
        if selected {
            cx.action(MessageViewAction::Select { message_id: self.message_id() });
        }
        selected
    }

    /// Asks the host to resend once to every distinct recipient with a replayable error.
    fn retry(&self, cx: &mut Cx) {
        let message_id = self.message_id();
        let targets = ErrorAggregator::retry_targets(&self.entity.get());
        info!("Resending message {message_id} to {} recipient(s)", targets.len());
        for recipient in targets {
            cx.action(MessageViewAction::Resend { message_id: message_id.clone(), recipient });
        }
    }
}


#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use serde_json::Value;

    use super::*;
    use crate::{
        cx::ManualClock,
        dom::ViewTree,
        error::TreeError,
        i18n::Localizer,
        markup::{Fragment, TemplateRenderer},
        text::TextProcessor,
        model::{Attachment, DeliveryError, DeliveryErrorKind, GroupUpdate, MessageFlags, MessageType},
    };

    const T0: i64 = 1_700_000_000_000;

    fn outgoing(body: &str) -> Message {
        Message {
            body: Some(body.into()),
            sent_at: T0,
            ..Message::new("m1", MessageType::Outgoing)
        }
    }

    fn incoming(body: &str) -> Message {
        Message {
            body: Some(body.into()),
            sent_at: T0,
            contact: Some(Contact::new("+15550001").with_name("Alice").with_color("blue")),
            ..Message::new("m1", MessageType::Incoming)
        }
    }

    fn setup(message: Message) -> (ManualClock, Cx, MessageEntity, MessageView) {
        let clock = ManualClock::starting_at(T0);
        let mut cx = Cx::new(clock.clone());
        let entity = MessageEntity::new(message);
        let mut view = MessageView::new(&mut cx, entity.clone());
        view.render(&mut cx);
        (clock, cx, entity, view)
    }

    fn removals(actions: &[MessageViewAction]) -> usize {
        actions.iter().filter(|a| matches!(a, MessageViewAction::Removed { .. })).count()
    }

    fn class(cx: &Cx, view: &MessageView, name: &str) -> NodeId {
        cx.tree.find_by_class(view.root(), name).unwrap()
    }

    #[test]
    fn dispatch_table() {
        use ChangedFields as F;
        assert!(updates_for(F::empty(), false).is_empty());
        assert_eq!(updates_for(F::BODY, false), vec![Update::Full]);
        assert_eq!(updates_for(F::BODY | F::DELIVERED, false), vec![Update::Full]);
        assert_eq!(updates_for(F::ERRORS, true), vec![Update::Full]);
        assert_eq!(updates_for(F::ERRORS, false), vec![Update::Errors, Update::Sent]);
        assert_eq!(updates_for(F::DELIVERED, false), vec![Update::Delivered, Update::Sent]);
        assert_eq!(updates_for(F::EXPIRATION_START, true), vec![Update::Expiring, Update::Sent]);
        assert_eq!(updates_for(F::FLAGS, false), vec![Update::Control, Update::Sent]);
        assert_eq!(updates_for(F::GROUP_UPDATE, true), vec![Update::Control, Update::Sent]);
        assert_eq!(updates_for(F::SENT, false), vec![Update::Sent]);
        assert_eq!(updates_for(F::OTHER, true), vec![Update::Sent]);
        assert_eq!(
            updates_for(F::ERRORS | F::DELIVERED | F::FLAGS, false),
            vec![Update::Errors, Update::Delivered, Update::Control, Update::Sent],
        );
    }

    #[test]
    fn renders_the_message() {
        let (_clock, cx, _entity, view) = setup(incoming("see https://example.org\nbye"));
        let root = view.root();
        assert_eq!(cx.tree.tag(root), Some("li"));
        assert!(cx.tree.has_class(root, "entry"));
        assert!(cx.tree.has_class(root, "incoming"));
        assert_eq!(cx.tree.attr(root, "id"), Some("m1"));

        assert_eq!(cx.tree.text_content(class(&cx, &view, "sender")), "Alice");
        assert_eq!(cx.tree.text_content(class(&cx, &view, "avatar")), "A");
        assert!(cx.tree.has_class(class(&cx, &view, "bubble"), "blue"));

        let body = class(&cx, &view, "body");
        assert_eq!(
            cx.tree.to_html(body),
            "<span class=\"body\">see <a href=\"https://example.org\" target=\"_blank\">https://example.org</a><br>bye</span>",
        );
        assert!(!cx.tree.text_content(class(&cx, &view, "timestamp")).is_empty());
    }

    #[test]
    fn body_change_rerenders() {
        let (_clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        let old_bubble = class(&cx, &view, "bubble");
        entity.set_body("edited");
        assert_eq!(view.process_signals(&mut cx), 1);
        assert!(!cx.tree.contains(old_bubble));
        assert_eq!(cx.tree.text_content(class(&cx, &view, "body")), "edited");
    }

    #[test]
    fn sent_and_delivered_partials() {
        let (_clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        let bubble = class(&cx, &view, "bubble");
        entity.set_sent(true);
        entity.set_delivered(true);
        view.process_signals(&mut cx);
        assert!(cx.tree.has_class(view.root(), "sent"));
        assert!(cx.tree.has_class(view.root(), "delivered"));
        assert!(cx.tree.contains(bubble));

        entity.set_delivered(false);
        view.process_signals(&mut cx);
        assert!(!cx.tree.has_class(view.root(), "delivered"));
    }

    #[test]
    fn incoming_messages_never_show_sent() {
        let (_clock, mut cx, entity, mut view) = setup(incoming("hello"));
        entity.set_sent(true);
        view.process_signals(&mut cx);
        assert!(!cx.tree.has_class(view.root(), "sent"));
    }

    #[test]
    fn pending_then_done() {
        let (_clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        entity.mark_pending();
        view.process_signals(&mut cx);
        assert!(cx.tree.has_class(view.root(), "pending"));
        entity.mark_done();
        view.process_signals(&mut cx);
        assert!(!cx.tree.has_class(view.root(), "pending"));
    }

    #[test]
    fn destroyed_between_pending_and_done_still_removes() {
        let (_clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        let root = view.root();
        entity.mark_pending();
        view.process_signals(&mut cx);
        assert!(cx.tree.has_class(root, "pending"));

        entity.destroy();
        entity.mark_done();
        view.process_signals(&mut cx);
        assert_eq!(view.lifecycle(), Lifecycle::Removed);
        assert!(!cx.tree.contains(root));
        assert!(cx.tree.is_empty());
        assert_eq!(removals(cx.actions()), 1);
        assert_eq!(cx.pending_timers(), 0);

        entity.set_body("too late");
        assert_eq!(entity.subscriber_count(), 0);
        assert_eq!(view.process_signals(&mut cx), 0);
    }

    #[test]
    fn expiry_removes_on_animation_end() {
        let (_clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        entity.expire();
        view.process_signals(&mut cx);
        assert_eq!(view.lifecycle(), Lifecycle::Expiring);
        assert!(cx.tree.has_class(view.root(), "expired"));

        // Destruction during the exit animation is left to the expiry path.
        entity.destroy();
        view.process_signals(&mut cx);
        assert_eq!(view.lifecycle(), Lifecycle::Expiring);

        let body = class(&cx, &view, "body");
        assert!(!view.handle_event(&mut cx, &Event::AnimationEnd(body)));
        let bubble = class(&cx, &view, "bubble");
        assert!(view.handle_event(&mut cx, &Event::AnimationEnd(bubble)));
        assert_eq!(view.lifecycle(), Lifecycle::Removed);
        assert_eq!(cx.pending_timers(), 0);
        assert_eq!(removals(cx.actions()), 1);
    }

    #[test]
    fn expiry_failsafe_removes_without_animation() {
        let (clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        let bubble = class(&cx, &view, "bubble");
        entity.expire();
        view.process_signals(&mut cx);

        clock.advance(Duration::from_millis(999));
        assert!(cx.take_due_timers().is_empty());
        clock.advance(Duration::from_millis(1));
        for event in cx.take_due_timers() {
            view.handle_event(&mut cx, &event);
        }
        assert_eq!(view.lifecycle(), Lifecycle::Removed);

        // A late animation event finds nothing left to do.
        assert!(!view.handle_event(&mut cx, &Event::AnimationEnd(bubble)));
        assert!(!view.remove(&mut cx));
        assert_eq!(removals(cx.actions()), 1);
    }

    #[test]
    fn expired_views_ignore_content_changes() {
        let (_clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        entity.expire();
        view.process_signals(&mut cx);
        let bubble = class(&cx, &view, "bubble");
        entity.set_body("changed");
        entity.set_delivered(true);
        view.process_signals(&mut cx);
        assert!(cx.tree.contains(bubble));
        assert_eq!(cx.tree.text_content(class(&cx, &view, "body")), "hello");
        assert!(!cx.tree.has_class(view.root(), "delivered"));
    }

    #[test]
    fn countdown_ticks_until_expiry() {
        let (clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        entity.update(|m| {
            m.expire_timer = Some(10);
            ChangedFields::EXPIRE_TIMER
        });
        entity.start_expiration(T0);
        view.process_signals(&mut cx);
        let sand = class(&cx, &view, "sand");
        assert_eq!(cx.tree.style(sand, "transform"), Some("translateY(0%)"));

        clock.advance(Duration::from_secs(5));
        for event in cx.take_due_timers() {
            view.handle_event(&mut cx, &event);
        }
        let sand = class(&cx, &view, "sand");
        assert_eq!(cx.tree.style(sand, "transform"), Some("translateY(50%)"));

        // A full render re-binds the countdown to the new `.timer`.
        entity.set_body("edited");
        view.process_signals(&mut cx);
        let sand = class(&cx, &view, "sand");
        assert_eq!(cx.tree.style(sand, "transform"), Some("translateY(50%)"));
    }

    #[test]
    fn outgoing_errors_are_a_partial_update() {
        let (_clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        let body = class(&cx, &view, "body");
        entity.push_error(DeliveryError::new(DeliveryErrorKind::Other, "+1", false));
        entity.push_error(DeliveryError::network("+2"));
        view.process_signals(&mut cx);
        assert!(cx.tree.contains(body));
        assert_eq!(cx.tree.find_all_by_class(view.root(), "error-icon-container").len(), 1);
        assert_eq!(cx.tree.find_all_by_class(view.root(), "hasRetry").len(), 1);
    }

    #[test]
    fn incoming_errors_rerender_with_description() {
        let (_clock, mut cx, entity, mut view) = setup(incoming("hello"));
        entity.set_errors(vec![
            DeliveryError::new(DeliveryErrorKind::IdentityKey, "+1", false),
            DeliveryError::network("+1"),
        ]);
        view.process_signals(&mut cx);
        let content = class(&cx, &view, "content");
        assert!(cx.tree.has_class(content, "error-message"));
        assert_eq!(cx.tree.text_content(content), "Error handling incoming message.");
        assert_eq!(cx.tree.find_all_by_class(view.root(), "error-icon-container").len(), 1);
        assert_eq!(cx.tree.find_all_by_class(view.root(), "hasRetry").len(), 1);
    }

    #[test]
    fn retry_resends_once_per_replayable_recipient() {
        let (_clock, mut cx, entity, mut view) = setup(outgoing("hello"));
        entity.set_errors(vec![
            DeliveryError::network("+1"),
            DeliveryError::new(DeliveryErrorKind::Other, "+2", false),
            DeliveryError::network("+1"),
            DeliveryError::unregistered("+3"),
        ]);
        view.process_signals(&mut cx);
        cx.take_actions();

        let retry = class(&cx, &view, "retry");
        assert!(view.handle_event(&mut cx, &Event::Click(retry)));
        assert_eq!(cx.take_actions(), vec![
            MessageViewAction::Resend { message_id: "m1".into(), recipient: "+1".into() },
            MessageViewAction::Resend { message_id: "m1".into(), recipient: "+3".into() },
        ]);
    }

    #[test]
    fn clicks_select_the_message() {
        let (_clock, mut cx, _entity, mut view) = setup(outgoing("hello"));
        let timestamp = class(&cx, &view, "timestamp");
        assert!(view.handle_event(&mut cx, &Event::Click(timestamp)));
        assert_eq!(cx.take_actions(), vec![MessageViewAction::Select { message_id: "m1".into() }]);

        let body = class(&cx, &view, "body");
        assert!(!view.handle_event(&mut cx, &Event::Click(body)));
        let elsewhere = cx.tree.create_element("div");
        assert!(!view.handle_event(&mut cx, &Event::Click(elsewhere)));
        assert!(cx.actions().is_empty());
    }

    #[test]
    fn control_messages_show_their_description() {
        let (_clock, mut cx, entity, mut view) = setup(incoming("hello"));
        entity.set_group_update(Some(GroupUpdate { left: Some("Bob".into()), ..Default::default() }));
        view.process_signals(&mut cx);
        assert!(cx.tree.has_class(view.root(), "control"));
        assert_eq!(cx.tree.text_content(class(&cx, &view, "content")), "Bob left the group.");

        entity.set_group_update(None);
        view.process_signals(&mut cx);
        assert!(!cx.tree.has_class(view.root(), "control"));

        entity.set_flags(MessageFlags::END_SESSION);
        view.process_signals(&mut cx);
        assert_eq!(cx.tree.text_content(class(&cx, &view, "content")), "Secure session reset.");
    }

    #[test]
    fn contact_color_change_restyles_bubble_and_avatar() {
        let (_clock, mut cx, entity, mut view) = setup(incoming("hello"));
        let old_avatar = class(&cx, &view, "avatar");
        entity.set_contact_color(Some("red".into()));
        view.process_signals(&mut cx);

        let bubble = class(&cx, &view, "bubble");
        assert!(cx.tree.has_class(bubble, "red"));
        assert!(!cx.tree.has_class(bubble, "blue"));
        assert!(!cx.tree.contains(old_avatar));
        let avatar = class(&cx, &view, "avatar");
        assert!(cx.tree.has_class(avatar, "red"));
        assert_eq!(cx.tree.children(view.root())[0], avatar);
    }

    #[test]
    fn attachments_survive_full_renders() {
        let mut message = outgoing("hello");
        message.attachments.push(Attachment::new("a1", "image/jpeg"));
        let (_clock, mut cx, entity, mut view) = setup(message);
        let fetches = |actions: &[MessageViewAction]| actions
            .iter()
            .filter(|a| matches!(a, MessageViewAction::FetchAttachment { .. }))
            .count();
        assert_eq!(fetches(cx.actions()), 1);

        let resolved = Event::AttachmentResolved {
            attachment_id: "a1".into(),
            url: "https://cdn.example.org/a1.jpg".into(),
        };
        assert!(view.handle_event(&mut cx, &resolved));
        let node = view.attachments().handle("a1").unwrap().node();

        for body in ["one", "two", "three"] {
            entity.set_body(body);
            view.process_signals(&mut cx);
        }
        let container = class(&cx, &view, "attachments");
        assert_eq!(cx.tree.children(container), &[node]);
        assert_eq!(cx.tree.find_all_by_class(view.root(), "attachment").len(), 1);
        assert_eq!(fetches(cx.actions()), 1);

        let other = Event::AttachmentResolved { attachment_id: "zz".into(), url: "https://x.org".into() };
        assert!(!view.handle_event(&mut cx, &other));

        view.remove(&mut cx);
        assert!(!cx.tree.contains(node));
    }

    struct Bare;

    impl TemplateRenderer for Bare {
        fn render(&self, _template: TemplateId, _data: &Value) -> Fragment {
            vec![el("p").text("bare").into()]
        }
    }

    #[test]
    fn broken_templates_degrade_without_failing() {
        let mut cx = Cx::new(ManualClock::starting_at(T0)).with_templates(Bare);
        let entity = MessageEntity::new(outgoing("hello"));
        let mut view = MessageView::new(&mut cx, entity.clone());
        view.render(&mut cx);
        entity.push_error(DeliveryError::network("+1"));
        entity.start_expiration(T0);
        entity.set_contact_color(Some("red".into()));
        view.process_signals(&mut cx);
        assert_eq!(view.lifecycle(), Lifecycle::Live);
        assert_eq!(cx.tree.text_content(view.root()), "bare");
    }

    /// Records every node it is asked to process.
    #[derive(Clone, Default)]
    struct Recording(Rc<RefCell<Vec<NodeId>>>);

    impl Recording {
        fn take(&self) -> Vec<NodeId> {
            self.0.take()
        }
    }

    impl TextProcessor for Recording {
        fn process(&self, _tree: &mut ViewTree, node: NodeId) -> Result<(), TreeError> {
            self.0.borrow_mut().push(node);
            Ok(())
        }
    }

    struct KeysOnly;

    impl Localizer for KeysOnly {
        fn message(&self, key: &str, substitutions: &[&str]) -> String {
            format!("[{key}:{}]", substitutions.join(","))
        }
    }

    #[test]
    fn text_processors_run_on_body_and_control_content() {
        let emoji = Recording::default();
        let links = Recording::default();
        let mut cx = Cx::new(ManualClock::starting_at(T0))
            .with_emoji(emoji.clone())
            .with_links(links.clone())
            .with_localizer(KeysOnly);
        let entity = MessageEntity::new(outgoing("hello"));
        let mut view = MessageView::new(&mut cx, entity.clone());
        view.render(&mut cx);
        let body = class(&cx, &view, "body");
        assert_eq!(emoji.take(), vec![body]);
        assert_eq!(links.take(), vec![body]);

        entity.set_flags(MessageFlags::END_SESSION);
        view.process_signals(&mut cx);
        let content = class(&cx, &view, "content");
        assert_eq!(emoji.take(), vec![content]);
        assert!(links.take().is_empty());
        assert_eq!(cx.tree.text_content(content), "[sessionEnded:]");
    }

    #[test]
    fn descriptions_go_through_the_localizer() {
        let mut cx = Cx::new(ManualClock::starting_at(T0)).with_localizer(KeysOnly);
        let entity = MessageEntity::new(incoming("hello"));
        let mut view = MessageView::new(&mut cx, entity.clone());
        view.render(&mut cx);
        entity.set_group_update(Some(GroupUpdate { left: Some("Bob".into()), ..Default::default() }));
        view.process_signals(&mut cx);
        assert_eq!(cx.tree.text_content(class(&cx, &view, "content")), "[leftTheGroup:Bob]");
    }
}
