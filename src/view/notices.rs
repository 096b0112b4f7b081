//! Advisory list entries shown in a thread alongside messages:
//! disappearing-timer changes and safety-number changes.

use serde_json::json;
use tracing::warn;

use crate::{
    cx::{Cx, Event, MessageViewAction},
    dom::NodeId,
    error::ViewError,
    i18n::expiration_timer_name,
    markup::{el, Markup, TemplateId},
    model::Contact,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// Someone changed the disappearing-messages timer to `expire_timer` seconds.
    TimerUpdate {
        expire_timer: u64,
        source: Contact,
        /// Whether `source` is the local user.
        from_self: bool,
    },
    /// The safety number with `contact` changed.
    KeyChange { contact: Contact },
}

impl NoticeKind {
    fn classes(&self) -> &'static [&'static str] {
        match self {
            NoticeKind::TimerUpdate { .. } => &["expirationTimerUpdate", "advisory"],
            NoticeKind::KeyChange { .. } => &["keychange"],
        }
    }

    fn template(&self) -> TemplateId {
        match self {
            NoticeKind::TimerUpdate { .. } => TemplateId::ExpirationTimerUpdate,
            NoticeKind::KeyChange { .. } => TemplateId::KeyChange,
        }
    }
}

/// A single advisory entry. Re-renders whenever its contact changes.
#[derive(Debug)]
pub struct NoticeView {
    id: String,
    kind: NoticeKind,
    root: NodeId,
}

impl NoticeView {
    /// Creates the `li` root for the notice and renders it.
    pub fn new(cx: &mut Cx, id: impl Into<String>, kind: NoticeKind) -> Self {
        let id = id.into();
        let root = kind.classes()
            .iter()
            .fold(el("li"), |li, class| li.class(*class))
            .attr("id", id.as_str());
        let root = cx.tree.build(&Markup::from(root));
        let view = Self { id, kind, root };
        view.render(cx);
        view
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self) -> &NoticeKind {
        &self.kind
    }

    fn content_text(&self, cx: &Cx) -> String {
        match &self.kind {
            NoticeKind::TimerUpdate { expire_timer, source, from_self } => {
                let timer = expiration_timer_name(cx.localizer(), *expire_timer);
                if *from_self {
                    cx.t("youChangedTheTimer", &[timer.as_str()])
                } else {
                    cx.t("theyChangedTheTimer", &[source.title(), timer.as_str()])
                }
            }
            NoticeKind::KeyChange { contact } => cx.t("keychanged", &[contact.title()]),
        }
    }

    pub fn render(&self, cx: &mut Cx) {
        let data = json!({ "content": self.content_text(cx) });
        let fragment = cx.render_template(self.kind.template(), &data);
        if let Err(e) = cx.tree.replace_children(self.root, &fragment) {
            warn!("Failed to render notice {}: {e}", self.id);
        }
    }

    /// Replaces the contact the notice is about and re-renders.
    pub fn set_contact(&mut self, cx: &mut Cx, contact: Contact) {
        match &mut self.kind {
            NoticeKind::TimerUpdate { source, .. } => *source = contact,
            NoticeKind::KeyChange { contact: current } => *current = contact,
        }
        self.render(cx);
    }

    /// Handles a click on a key-change notice's content by asking the host
    /// to show the verification UI. Returns `true` if the event was consumed.
    pub fn handle_event(&mut self, cx: &mut Cx, event: &Event) -> bool {
        let Event::Click(target) = event else { return false };
        let NoticeKind::KeyChange { contact } = &self.kind else { return false };
        if !cx.tree.is_inclusive_descendant(*target, self.root)
            || cx.tree.closest_with_class(*target, "content", self.root).is_none()
        {
            return false;
        }
        cx.action(MessageViewAction::VerifyIdentity { contact_id: contact.id.clone() });
        true
    }

    /// Removes the notice from the tree.
    pub fn remove(self, cx: &mut Cx) -> Result<(), ViewError> {
        if !cx.tree.remove(self.root) {
            return Err(ViewError::Removed);
        }
        Ok(())
    }
}
