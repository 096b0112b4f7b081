use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::i18n::Localizer;
use super::{attachment::Attachment, contact::Contact, delivery_error::DeliveryError};

/// Whether we received the message or sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Incoming,
    Outgoing,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Incoming => "incoming",
            MessageType::Outgoing => "outgoing",
        }
    }
}

bitflags! {
    /// Control markers carried in a message's `flags` field.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct MessageFlags: u32 {
        const END_SESSION = 1 << 0;
    }
}

bitflags! {
    /// The fields named by a [`MessageSignal::Changed`](super::entity::MessageSignal) notification.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct ChangedFields: u16 {
        const BODY             = 1 << 0;
        const ERRORS           = 1 << 1;
        const DELIVERED        = 1 << 2;
        const SENT             = 1 << 3;
        const EXPIRATION_START = 1 << 4;
        const EXPIRE_TIMER     = 1 << 5;
        const FLAGS            = 1 << 6;
        const GROUP_UPDATE     = 1 << 7;
        /// Any field the view does not track individually.
        const OTHER            = 1 << 15;
    }
}

/// A change to a group's name or membership.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub joined: Vec<String>,
    /// The member who left, if this update is a departure.
    pub left: Option<String>,
}

/// A chat message, as observed by its view.
///
/// The view never owns or persists this; it reads it whenever a change
/// notification arrives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub body: Option<String>,
    /// When the message was sent, in milliseconds since the Unix epoch.
    pub sent_at: i64,
    pub sent: bool,
    pub delivered: bool,
    /// Delivery errors, in the order they were reported.
    pub errors: Vec<DeliveryError>,
    /// The disappearing-messages timer, in seconds.
    pub expire_timer: Option<u64>,
    /// When the countdown started, in milliseconds since the Unix epoch.
    pub expiration_start_timestamp: Option<i64>,
    pub attachments: Vec<Attachment>,
    /// Raw [`MessageFlags`] bits.
    pub flags: u32,
    pub group_update: Option<GroupUpdate>,
    /// The sender of an incoming message, if known.
    pub contact: Option<Contact>,
}

impl Message {
    pub fn new(id: impl Into<String>, message_type: MessageType) -> Self {
        Self { id: id.into(), message_type, ..Default::default() }
    }

    pub fn is_incoming(&self) -> bool {
        self.message_type == MessageType::Incoming
    }

    pub fn is_outgoing(&self) -> bool {
        self.message_type == MessageType::Outgoing
    }

    pub fn flags(&self) -> MessageFlags {
        MessageFlags::from_bits_truncate(self.flags)
    }

    pub fn is_end_session(&self) -> bool {
        self.flags().contains(MessageFlags::END_SESSION)
    }

    pub fn is_group_update(&self) -> bool {
        self.group_update.is_some()
    }

    /// The contact to show as the sender. Outgoing messages never have one.
    pub fn sender_contact(&self) -> Option<&Contact> {
        if self.is_incoming() { self.contact.as_ref() } else { None }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_network_error(&self) -> bool {
        self.errors.iter().any(DeliveryError::is_network)
    }

    /// Whether resending is meaningful for `error`.
    pub fn is_replayable_error(&self, error: &DeliveryError) -> bool {
        error.replayable
    }

    /// The full countdown length, if the message disappears at all.
    pub fn expire_duration(&self) -> Option<Duration> {
        self.expire_timer.filter(|s| *s > 0).map(Duration::from_secs)
    }

    /// Whether the countdown has been started.
    pub fn is_expiring(&self) -> bool {
        self.expire_duration().is_some() && self.expiration_start_timestamp.is_some()
    }

    /// Time left until expiry as of `now_millis`, clamped at zero.
    /// `None` if the message is not expiring.
    pub fn time_til_expire(&self, now_millis: i64) -> Option<Duration> {
        let total = self.expire_duration()?;
        let start = self.expiration_start_timestamp?;
        let total = i64::try_from(total.as_millis()).unwrap_or(i64::MAX);
        let expires_at = start.saturating_add(total);
        let remaining = expires_at.saturating_sub(now_millis).max(0);
        Some(Duration::from_millis(remaining as u64))
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.time_til_expire(now_millis).is_some_and(|d| d.is_zero())
    }

    /// The text to show instead of (or as) the body.
    pub fn description(&self, localizer: &dyn Localizer) -> String {
        if let Some(update) = &self.group_update {
            if let Some(left) = &update.left {
                return localizer.message("leftTheGroup", &[left.as_str()]);
            }
            let mut parts = vec![localizer.message("groupUpdated", &[])];
            if let Some(name) = &update.name {
                parts.push(localizer.message("titleIsNow", &[name.as_str()]));
            }
            if !update.joined.is_empty() {
                parts.push(localizer.message("joinedTheGroup", &[update.joined.join(", ").as_str()]));
            }
            return parts.join(" ");
        }
        if self.is_end_session() {
            return localizer.message("sessionEnded", &[]);
        }
        if self.is_incoming() && self.has_errors() {
            return localizer.message("incomingError", &[]);
        }
        self.body.clone().unwrap_or_default()
    }
}
