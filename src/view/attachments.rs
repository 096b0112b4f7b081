//! Mounting attachment sub-views under a message, exactly once.
//!
//! Each attachment gets one [`AttachmentHandle`] for the lifetime of the
//! message view. A handle owns a pinned `div.attachment` node, so the node
//! survives the full re-renders that replace the `.attachments` container
//! around it. After such a re-render the controller calls
//! [`AttachmentReconciler::invalidate_mounts`] and then
//! [`AttachmentReconciler::load`] again, which re-validates every handle's
//! mount point instead of recreating (and re-fetching) the handle.

use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::{
    cx::{Cx, MessageViewAction},
    dom::NodeId,
    error::ViewError,
    markup::{el, Markup, TemplateId},
    model::{Attachment, AttachmentKind},
};

/// Where a handle is in its life: `Created → Rendering → Resolved`.
/// Whether a resolved handle is currently mounted is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Created,
    /// The placeholder is rendered and the content has been requested.
    Rendering,
    /// The content has been rendered into the handle's node.
    Resolved,
}

#[derive(Debug)]
pub struct AttachmentHandle {
    attachment: Attachment,
    node: NodeId,
    state: AttachmentState,
    /// `true` once `node` is confirmed mounted under the current `.attachments` container.
    attached: bool,
}

impl AttachmentHandle {
    fn new(cx: &mut Cx, attachment: &Attachment) -> Result<Self, ViewError> {
        let node = cx.tree.build(&Markup::from(
            el("div")
                .class("attachment")
                .attr("data-attachment-id", attachment.id.as_str())
        ));
        cx.tree.pin(node)?;
        Ok(Self {
            attachment: attachment.clone(),
            node,
            state: AttachmentState::Created,
            attached: false,
        })
    }

    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn state(&self) -> AttachmentState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    fn render_placeholder(&mut self, cx: &mut Cx) -> Result<(), ViewError> {
        let data = json!({
            "fileName": self.attachment.display_name(),
            "size": self.attachment.human_size(),
        });
        let placeholder = cx.render_template(TemplateId::AttachmentPlaceholder, &data);
        cx.tree.replace_children(self.node, &placeholder)?;
        self.state = AttachmentState::Rendering;
        Ok(())
    }

    fn render_content(&mut self, cx: &mut Cx, url: &Url) -> Result<(), ViewError> {
        let content = content_markup(&self.attachment, url);
        cx.tree.replace_children(self.node, std::slice::from_ref(&content))?;
        self.state = AttachmentState::Resolved;
        self.attached = false;
        Ok(())
    }

    /// Mounts this handle's node under the current `.attachments` container
    /// of `root`, unless it is already there. Safe to call at any time.
    ///
    /// Returns `true` if the tree was changed.
    fn try_append(&mut self, cx: &mut Cx, root: NodeId, message_id: &str) -> Result<bool, ViewError> {
        if self.state != AttachmentState::Resolved {
            return Ok(false);
        }
        let container = cx.tree
            .find_by_class(root, "attachments")
            .ok_or(ViewError::MissingRole("attachments"))?;
        if cx.tree.parent(self.node) == Some(container) {
            self.attached = true;
            return Ok(false);
        }
        if self.attached {
            return Ok(false);
        }

        cx.action(MessageViewAction::BeforeChangeHeight { message_id: message_id.to_string() });
        cx.tree.append_child(container, self.node)?;
        cx.action(MessageViewAction::AfterChangeHeight { message_id: message_id.to_string() });
        self.attached = true;
        Ok(true)
    }
}

fn content_markup(attachment: &Attachment, url: &Url) -> Markup {
    let src = url.as_str();
    match attachment.kind() {
        AttachmentKind::Image => el("img")
            .attr("src", src)
            .attr("alt", attachment.display_name())
            .into(),
        AttachmentKind::Audio => el("audio").attr("controls", "").attr("src", src).into(),
        AttachmentKind::Video => el("video").attr("controls", "").attr("src", src).into(),
        AttachmentKind::File => el("a")
            .class("file")
            .attr("href", src)
            .attr("download", attachment.display_name())
            .text(attachment.display_name())
            .child(el("span").class("size").text(attachment.human_size()))
            .into(),
    }
}

/// Owns the attachment handles of one message view.
#[derive(Debug, Default)]
pub struct AttachmentReconciler {
    message_id: String,
    handles: Vec<AttachmentHandle>,
}

impl AttachmentReconciler {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self { message_id: message_id.into(), handles: Vec::new() }
    }

    pub fn handles(&self) -> &[AttachmentHandle] {
        &self.handles
    }

    pub fn handle(&self, attachment_id: &str) -> Option<&AttachmentHandle> {
        self.handles.iter().find(|h| h.attachment.id == attachment_id)
    }

    /// Creates a handle for every attachment that does not have one yet
    /// (rendering its placeholder and requesting its content), then makes
    /// an append attempt for every existing handle.
    pub fn load(&mut self, cx: &mut Cx, root: NodeId, attachments: &[Attachment]) -> Result<(), ViewError> {
        for attachment in attachments {
            if self.handle(&attachment.id).is_some() {
                continue;
            }
            let mut handle = AttachmentHandle::new(cx, attachment)?;
            handle.render_placeholder(cx)?;
            debug!("Requesting content of attachment {} of message {}", attachment.id, self.message_id);
            cx.action(MessageViewAction::FetchAttachment {
                message_id: self.message_id.clone(),
                attachment_id: attachment.id.clone(),
            });
            self.handles.push(handle);
        }
        for handle in &mut self.handles {
            handle.try_append(cx, root, &self.message_id)?;
        }
        Ok(())
    }

    /// Forgets every handle's mount, e.g., because the container it was
    /// mounted under has just been replaced.
    pub fn invalidate_mounts(&mut self) {
        for handle in &mut self.handles {
            handle.attached = false;
        }
    }

    /// Renders the resolved content of an attachment and mounts it.
    ///
    /// Returns `false` if no handle exists for `attachment_id` or `url` is
    /// not a valid URL; the placeholder stays in that case.
    pub fn resolve(&mut self, cx: &mut Cx, root: NodeId, attachment_id: &str, url: &str) -> Result<bool, ViewError> {
        let Some(handle) = self.handles.iter_mut().find(|h| h.attachment.id == attachment_id) else {
            debug!("Ignoring content for unknown attachment {attachment_id} of message {}", self.message_id);
            return Ok(false);
        };
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Attachment {attachment_id} of message {} resolved to an invalid URL {url:?}: {e}", self.message_id);
                return Ok(false);
            }
        };
        handle.render_content(cx, &url)?;
        handle.try_append(cx, root, &self.message_id)?;
        Ok(true)
    }

    /// Frees every handle's node. Called once, when the message view is removed.
    pub fn release(&mut self, cx: &mut Cx) {
        for handle in self.handles.drain(..) {
            cx.tree.remove(handle.node);
        }
    }
}
