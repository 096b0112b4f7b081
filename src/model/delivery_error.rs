use serde::{Deserialize, Serialize};

/// The class of a per-recipient delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    /// The message could not reach the server or the recipient's devices.
    Network,
    /// The recipient is not registered with the service.
    UnregisteredUser,
    /// The recipient's identity key changed and must be re-verified.
    IdentityKey,
    #[default]
    Other,
}

/// One delivery failure, recorded against the message in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    /// The recipient this error is about (a phone number or user ID).
    pub recipient: String,
    /// Whether resending to `recipient` is meaningful.
    pub replayable: bool,
    /// A human-readable description, if the sender gave one.
    pub message: String,
}

impl DeliveryError {
    pub fn new(kind: DeliveryErrorKind, recipient: impl Into<String>, replayable: bool) -> Self {
        Self {
            kind,
            recipient: recipient.into(),
            replayable,
            message: String::new(),
        }
    }

    /// A replayable network error for `recipient`.
    pub fn network(recipient: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::Network, recipient, true)
    }

    /// A replayable unregistered-recipient error for `recipient`.
    pub fn unregistered(recipient: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::UnregisteredUser, recipient, true)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_network(&self) -> bool {
        self.kind == DeliveryErrorKind::Network
    }

    pub fn is_unregistered_user(&self) -> bool {
        self.kind == DeliveryErrorKind::UnregisteredUser
    }
}
