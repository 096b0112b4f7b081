//! The single-threaded context every view is driven through.
//!
//! A [`Cx`] owns the [`ViewTree`], the clock, the pending timeouts, and the
//! queue of [`MessageViewAction`]s that views emit for their host. The host
//! loop feeds [`Event`]s back into the views: due timers, finished
//! animations, clicks, and resolved attachment content. Every handler runs
//! to completion before the next event is delivered.

use std::{cell::Cell, collections::BTreeMap, fmt, rc::Rc, time::Duration};

use serde_json::Value;

use crate::{
    config::MessageViewConfig,
    dom::{NodeId, ViewTree},
    error::TreeError,
    i18n::{EnglishMessages, Localizer},
    markup::{DefaultTemplates, Fragment, TemplateId, TemplateRenderer},
    text::{LinkifyText, PlainEmoji, TextProcessor},
};

/// A source of the current wall-clock time, in milliseconds since the Unix epoch.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<i64>>);

impl ManualClock {
    pub fn starting_at(millis: i64) -> Self {
        Self(Rc::new(Cell::new(millis)))
    }

    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.0.set(self.0.get().saturating_add(by));
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.get()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// A handle to a (possibly already fired or stopped) timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timer(Option<TimerId>);

impl Timer {
    pub const fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Returns `true` if `event` is this timer firing.
    pub fn is_event(&self, event: &Event) -> bool {
        matches!((self.0, event), (Some(id), Event::Timer(fired)) if id == *fired)
    }
}

/// An input delivered by the host to a view's `handle_event`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A timeout started with [`Cx::start_timeout`] has elapsed.
    Timer(TimerId),
    /// A CSS animation finished on the given node.
    AnimationEnd(NodeId),
    /// The user clicked the given node.
    Click(NodeId),
    /// The content of an attachment finished loading and is available at `url`.
    AttachmentResolved {
        attachment_id: String,
        url: String,
    },
}

/// Notifications a view emits for its host (the thread list, the conversation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageViewAction {
    /// The user selected this message, e.g., to show its details.
    Select { message_id: String },
    /// The view's height is about to change because an attachment is being mounted.
    BeforeChangeHeight { message_id: String },
    /// The view's height has changed because an attachment was mounted.
    AfterChangeHeight { message_id: String },
    /// The user asked to verify the safety number of the given contact.
    VerifyIdentity { contact_id: String },
    /// The user asked to resend the message to `recipient`.
    Resend { message_id: String, recipient: String },
    /// The view needs the content of this attachment.
    FetchAttachment { message_id: String, attachment_id: String },
    /// The view has removed its element from the tree and is done.
    Removed { message_id: String },
}

/// The view context. See the module-level docs.
pub struct Cx {
    pub tree: ViewTree,
    clock: Box<dyn Clock>,
    timers: BTreeMap<TimerId, i64>,
    next_timer: u64,
    actions: Vec<MessageViewAction>,
    templates: Box<dyn TemplateRenderer>,
    localizer: Box<dyn Localizer>,
    emoji: Box<dyn TextProcessor>,
    links: Box<dyn TextProcessor>,
    config: MessageViewConfig,
}

impl Cx {
    /// Creates a context with the built-in templates, English strings,
    /// plain emoji, link-ification, and the default config.
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            tree: ViewTree::new(),
            clock: Box::new(clock),
            timers: BTreeMap::new(),
            next_timer: 0,
            actions: Vec::new(),
            templates: Box::new(DefaultTemplates),
            localizer: Box::new(EnglishMessages),
            emoji: Box::new(PlainEmoji),
            links: Box::new(LinkifyText),
            config: MessageViewConfig::default(),
        }
    }

    pub fn with_templates(mut self, templates: impl TemplateRenderer + 'static) -> Self {
        self.templates = Box::new(templates);
        self
    }

    pub fn with_localizer(mut self, localizer: impl Localizer + 'static) -> Self {
        self.localizer = Box::new(localizer);
        self
    }

    pub fn with_emoji(mut self, emoji: impl TextProcessor + 'static) -> Self {
        self.emoji = Box::new(emoji);
        self
    }

    pub fn with_links(mut self, links: impl TextProcessor + 'static) -> Self {
        self.links = Box::new(links);
        self
    }

    pub fn with_config(mut self, config: MessageViewConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MessageViewConfig {
        &self.config
    }

    pub fn localizer(&self) -> &dyn Localizer {
        self.localizer.as_ref()
    }

    /// Shorthand for a localized message.
    pub fn t(&self, key: &str, substitutions: &[&str]) -> String {
        self.localizer.message(key, substitutions)
    }

    pub fn render_template(&self, template: TemplateId, data: &Value) -> Fragment {
        self.templates.render(template, data)
    }

    pub fn apply_emoji(&mut self, node: NodeId) -> Result<(), TreeError> {
        self.emoji.process(&mut self.tree, node)
    }

    pub fn apply_links(&mut self, node: NodeId) -> Result<(), TreeError> {
        self.links.process(&mut self.tree, node)
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Schedules an [`Event::Timer`] to be due `delay` from now.
    pub fn start_timeout(&mut self, delay: Duration) -> Timer {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        let delay = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let deadline = self.now_millis().saturating_add(delay);
        self.timers.insert(id, deadline);
        Timer(Some(id))
    }

    /// Cancels a timeout. Stopping an empty, fired, or already stopped timer does nothing.
    pub fn stop_timer(&mut self, timer: Timer) {
        if let Timer(Some(id)) = timer {
            self.timers.remove(&id);
        }
    }

    pub fn is_timer_pending(&self, timer: Timer) -> bool {
        timer.0.is_some_and(|id| self.timers.contains_key(&id))
    }

    /// The number of timeouts that have been started but have neither fired nor been stopped.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.timers.values().min().copied()
    }

    /// Removes every timeout that is due by now and returns their events,
    /// earliest deadline first.
    pub fn take_due_timers(&mut self) -> Vec<Event> {
        let now = self.now_millis();
        let mut due: Vec<(i64, TimerId)> = self.timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.timers.remove(id);
        }
        due.into_iter().map(|(_, id)| Event::Timer(id)).collect()
    }

    pub fn action(&mut self, action: MessageViewAction) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[MessageViewAction] {
        &self.actions
    }

    pub fn take_actions(&mut self) -> Vec<MessageViewAction> {
        std::mem::take(&mut self.actions)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_deadline_order() {
        let clock = ManualClock::starting_at(1_000);
        let mut cx = Cx::new(clock.clone());
        let late = cx.start_timeout(Duration::from_millis(300));
        let early = cx.start_timeout(Duration::from_millis(100));
        clock.advance(Duration::from_millis(50));
        assert!(cx.take_due_timers().is_empty());

        clock.advance(Duration::from_millis(500));
        let fired = cx.take_due_timers();
        assert_eq!(fired.len(), 2);
        assert!(early.is_event(&fired[0]));
        assert!(late.is_event(&fired[1]));
        assert_eq!(cx.pending_timers(), 0);
    }

    #[test]
    fn stopped_timers_never_fire() {
        let clock = ManualClock::starting_at(0);
        let mut cx = Cx::new(clock.clone());
        let timer = cx.start_timeout(Duration::from_millis(10));
        assert!(cx.is_timer_pending(timer));
        cx.stop_timer(timer);
        cx.stop_timer(timer);
        cx.stop_timer(Timer::empty());
        clock.advance(Duration::from_secs(1));
        assert!(cx.take_due_timers().is_empty());
        assert!(!cx.is_timer_pending(timer));
    }

    #[test]
    fn empty_timer_matches_nothing() {
        let clock = ManualClock::starting_at(0);
        let mut cx = Cx::new(clock.clone());
        let timer = cx.start_timeout(Duration::ZERO);
        let fired = cx.take_due_timers();
        assert!(!Timer::empty().is_event(&fired[0]));
        assert!(timer.is_event(&fired[0]));
    }

    #[test]
    fn huge_timeout_stays_pending() {
        let clock = ManualClock::starting_at(0);
        let mut cx = Cx::new(clock.clone());
        let timer = cx.start_timeout(Duration::from_secs(u64::MAX));
        clock.advance(Duration::from_secs(3600));
        assert!(cx.take_due_timers().is_empty());
        assert!(cx.is_timer_pending(timer));
    }

    #[test]
    fn actions_drain() {
        let mut cx = Cx::new(ManualClock::default());
        cx.action(MessageViewAction::Select { message_id: "m".into() });
        assert_eq!(cx.actions().len(), 1);
        assert_eq!(cx.take_actions().len(), 1);
        assert!(cx.actions().is_empty());
    }
}
