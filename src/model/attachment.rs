use bytesize::ByteSize;
use mime::Mime;
use serde::{Deserialize, Serialize};

/// How an attachment's content is presented once it has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    File,
}

/// An attachment of a message. Its content is fetched elsewhere and
/// delivered to the view as an [`Event::AttachmentResolved`](crate::cx::Event).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub id: String,
    pub content_type: String,
    pub file_name: Option<String>,
    /// The size of the content in bytes, if known.
    pub size: Option<u64>,
}

impl Attachment {
    pub fn new(id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    pub fn mime(&self) -> Option<Mime> {
        self.content_type.parse().ok()
    }

    /// Classifies the attachment by its top-level MIME type.
    /// Unparseable or unknown types are treated as plain files.
    pub fn kind(&self) -> AttachmentKind {
        match self.mime() {
            Some(m) if m.type_() == mime::IMAGE => AttachmentKind::Image,
            Some(m) if m.type_() == mime::AUDIO => AttachmentKind::Audio,
            Some(m) if m.type_() == mime::VIDEO => AttachmentKind::Video,
            _ => AttachmentKind::File,
        }
    }

    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("Attachment")
    }

    /// The size in human-readable form, e.g. "1.2 MiB", or empty if unknown.
    pub fn human_size(&self) -> String {
        self.size.map(|bytes| ByteSize::b(bytes).to_string()).unwrap_or_default()
    }
}
