//! The entities a message view observes but does not own.

pub mod attachment;
pub mod contact;
pub mod delivery_error;
pub mod entity;
pub mod message;

pub use attachment::{Attachment, AttachmentKind};
pub use contact::{Avatar, Contact};
pub use delivery_error::{DeliveryError, DeliveryErrorKind};
pub use entity::{MessageEntity, MessageSignal};
pub use message::{ChangedFields, GroupUpdate, Message, MessageFlags, MessageType};
