//! Views: the message controller and the components that own its slices.

pub mod attachments;
pub mod errors;
pub mod expiration;
pub mod message;
pub mod notices;
pub mod timestamp;

pub use attachments::{AttachmentHandle, AttachmentReconciler, AttachmentState};
pub use errors::ErrorAggregator;
pub use expiration::ExpirationScheduler;
pub use message::{Lifecycle, MessageView, Update};
pub use notices::{NoticeKind, NoticeView};
pub use timestamp::TimestampView;
