//! An observable message: shared state plus a broadcast of change signals.

use std::{cell::{Ref, RefCell}, rc::Rc};

use crossbeam_channel::{Receiver, Sender};

use super::{
    delivery_error::DeliveryError,
    message::{ChangedFields, GroupUpdate, Message, MessageFlags},
};

/// A notification from a message entity to the views observing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSignal {
    /// One or more fields changed.
    Changed(ChangedFields),
    /// The message was deleted.
    Destroyed,
    /// The message's disappearing timer ran out.
    Expired,
    /// A send of this message is in flight.
    Pending,
    /// The in-flight send finished, successfully or not.
    Done,
    /// The sender's contact changed colour.
    ContactColorChanged,
}

/// A shared handle to a [`Message`] that broadcasts a [`MessageSignal`]
/// to every subscriber whenever it changes. Clones share the same message.
#[derive(Debug, Clone, Default)]
pub struct MessageEntity {
    message: Rc<RefCell<Message>>,
    subscribers: Rc<RefCell<Vec<Sender<MessageSignal>>>>,
}

impl MessageEntity {
    pub fn new(message: Message) -> Self {
        Self {
            message: Rc::new(RefCell::new(message)),
            subscribers: Rc::default(),
        }
    }

    /// Borrows the current state. Do not hold this across a mutation.
    pub fn get(&self) -> Ref<'_, Message> {
        self.message.borrow()
    }

    pub fn id(&self) -> String {
        self.message.borrow().id.clone()
    }

    /// Returns a receiver of every signal emitted from now on.
    pub fn subscribe(&self) -> Receiver<MessageSignal> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.borrow_mut().push(sender);
        receiver
    }

    /// The number of subscribers whose receivers are still alive, as of the last emit.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Sends `signal` to every subscriber, dropping those that have gone away.
    pub fn emit(&self, signal: MessageSignal) {
        self.subscribers.borrow_mut().retain(|s| s.send(signal).is_ok());
    }

    /// Mutates the message and emits a `Changed` signal naming the fields
    /// that `f` reports as changed. Nothing is emitted if `f` reports none.
    pub fn update(&self, f: impl FnOnce(&mut Message) -> ChangedFields) {
        let changed = f(&mut *self.message.borrow_mut());
        if !changed.is_empty() {
            self.emit(MessageSignal::Changed(changed));
        }
    }

    fn set_field<T: PartialEq>(
        &self,
        field: ChangedFields,
        value: T,
        slot: impl FnOnce(&mut Message) -> &mut T,
    ) {
        self.update(|m| {
            let current = slot(m);
            if *current == value {
                ChangedFields::empty()
            } else {
                *current = value;
                field
            }
        });
    }

    pub fn set_body(&self, body: impl Into<String>) {
        self.set_field(ChangedFields::BODY, Some(body.into()), |m| &mut m.body);
    }

    pub fn set_sent(&self, sent: bool) {
        self.set_field(ChangedFields::SENT, sent, |m| &mut m.sent);
    }

    pub fn set_delivered(&self, delivered: bool) {
        self.set_field(ChangedFields::DELIVERED, delivered, |m| &mut m.delivered);
    }

    pub fn set_errors(&self, errors: Vec<DeliveryError>) {
        self.set_field(ChangedFields::ERRORS, errors, |m| &mut m.errors);
    }

    /// Appends one error to the end of the error list.
    pub fn push_error(&self, error: DeliveryError) {
        self.update(|m| {
            m.errors.push(error);
            ChangedFields::ERRORS
        });
    }

    pub fn start_expiration(&self, started_at_millis: i64) {
        self.set_field(
            ChangedFields::EXPIRATION_START,
            Some(started_at_millis),
            |m| &mut m.expiration_start_timestamp,
        );
    }

    pub fn set_flags(&self, flags: MessageFlags) {
        self.set_field(ChangedFields::FLAGS, flags.bits(), |m| &mut m.flags);
    }

    pub fn set_group_update(&self, update: Option<GroupUpdate>) {
        self.set_field(ChangedFields::GROUP_UPDATE, update, |m| &mut m.group_update);
    }

    /// Changes the sender contact's colour and notifies observers.
    pub fn set_contact_color(&self, color: Option<String>) {
        let changed = {
            let mut message = self.message.borrow_mut();
            match message.contact.as_mut() {
                Some(contact) if contact.color != color => {
                    contact.color = color;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(MessageSignal::ContactColorChanged);
        }
    }

    pub fn mark_pending(&self) {
        self.emit(MessageSignal::Pending);
    }

    pub fn mark_done(&self) {
        self.emit(MessageSignal::Done);
    }

    pub fn expire(&self) {
        self.emit(MessageSignal::Expired);
    }

    pub fn destroy(&self) {
        self.emit(MessageSignal::Destroyed);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{contact::Contact, message::MessageType};

    #[test]
    fn setters_only_signal_real_changes() {
        let entity = MessageEntity::new(Message::new("m1", MessageType::Outgoing));
        let signals = entity.subscribe();
        entity.set_sent(false);
        assert!(signals.try_recv().is_err());
        entity.set_sent(true);
        assert_eq!(signals.try_recv(), Ok(MessageSignal::Changed(ChangedFields::SENT)));
        assert!(entity.get().sent);
    }

    #[test]
    fn every_subscriber_sees_every_signal() {
        let entity = MessageEntity::new(Message::new("m1", MessageType::Outgoing));
        let a = entity.subscribe();
        let b = entity.subscribe();
        entity.mark_pending();
        entity.set_delivered(true);
        for rx in [&a, &b] {
            assert_eq!(rx.try_recv(), Ok(MessageSignal::Pending));
            assert_eq!(rx.try_recv(), Ok(MessageSignal::Changed(ChangedFields::DELIVERED)));
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let entity = MessageEntity::new(Message::new("m1", MessageType::Outgoing));
        let kept = entity.subscribe();
        drop(entity.subscribe());
        assert_eq!(entity.subscriber_count(), 2);
        entity.destroy();
        assert_eq!(entity.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok(MessageSignal::Destroyed));
    }

    #[test]
    fn contact_color_without_contact_is_silent() {
        let entity = MessageEntity::new(Message::new("m1", MessageType::Incoming));
        let signals = entity.subscribe();
        entity.set_contact_color(Some("red".into()));
        assert!(signals.try_recv().is_err());

        entity.update(|m| {
            m.contact = Some(Contact::new("+1"));
            ChangedFields::OTHER
        });
        entity.set_contact_color(Some("red".into()));
        assert_eq!(signals.try_recv(), Ok(MessageSignal::Changed(ChangedFields::OTHER)));
        assert_eq!(signals.try_recv(), Ok(MessageSignal::ContactColorChanged));
    }
}
