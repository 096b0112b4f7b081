//! The hourglass countdown of a disappearing message.

use std::time::Duration;

use serde_json::Value;

use crate::{
    cx::{Cx, Event, Timer},
    dom::NodeId,
    error::ViewError,
    markup::TemplateId,
    model::Message,
};

/// The share of the countdown that has passed, from `0.0` (just started)
/// to `1.0` (expired). `remaining` beyond `total` counts as not started.
pub fn elapsed_fraction(total: Duration, remaining: Duration) -> f64 {
    if total.is_zero() {
        return 1.0;
    }
    let remaining = remaining.min(total);
    (total - remaining).as_secs_f64() / total.as_secs_f64()
}

/// Drives the `.timer` slice of a message view until the message expires.
///
/// The scheduler keeps no countdown state of its own: every tick recomputes
/// the fraction from the message and the clock, so missed or late ticks
/// cost nothing but smoothness. It also never caches the `.timer` node,
/// since a full re-render may have replaced it since the last tick.
#[derive(Debug, Default)]
pub struct ExpirationScheduler {
    tick: Timer,
}

impl ExpirationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `event` is this scheduler's pending tick firing.
    pub fn is_tick(&self, event: &Event) -> bool {
        self.tick.is_event(event)
    }

    pub fn has_pending_tick(&self, cx: &Cx) -> bool {
        cx.is_timer_pending(self.tick)
    }

    pub fn cancel(&mut self, cx: &mut Cx) {
        cx.stop_timer(self.tick);
        self.tick = Timer::empty();
    }

    /// Redraws the hourglass under `root` and schedules the next tick.
    ///
    /// Any previously pending tick is cancelled first, so at most one is
    /// ever outstanding. Does nothing for a message that is not expiring
    /// or has already expired. Returns the elapsed fraction that was drawn.
    pub fn update(&mut self, cx: &mut Cx, root: NodeId, message: &Message) -> Result<Option<f64>, ViewError> {
        self.cancel(cx);

        let now = cx.now_millis();
        if message.is_expired(now) {
            return Ok(None);
        }
        let (Some(total), Some(remaining)) = (message.expire_duration(), message.time_til_expire(now)) else {
            return Ok(None);
        };

        let timer_node = cx.tree
            .find_by_class(root, "timer")
            .ok_or(ViewError::MissingRole("timer"))?;
        let hourglass = cx.render_template(TemplateId::Hourglass, &Value::Null);
        cx.tree.replace_children(timer_node, &hourglass)?;

        let elapsed = elapsed_fraction(total, remaining);
        if let Some(sand) = cx.tree.find_by_class(timer_node, "sand") {
            cx.tree.set_style(sand, "transform", format!("translateY({}%)", elapsed * 100.0))?;
        }
        cx.tree.set_style(timer_node, "display", "inline-block")?;

        let interval = cx.config().tick_interval(total);
        self.tick = cx.start_timeout(interval);
        Ok(Some(elapsed))
    }
}
