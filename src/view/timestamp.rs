//! The `.timestamp` slice: a brief, self-refreshing time label.

use std::{fmt::Display, time::Duration};

use chrono::{DateTime, Datelike, Local, TimeZone};

use crate::{
    cx::{Cx, Event, Timer},
    dom::NodeId,
    error::ViewError,
    i18n::Localizer,
};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const WEEK_MS: i64 = 7 * 24 * HOUR_MS;

const TIME_FMT_EN_US: &str = "%-I:%M %p";
const EXTENDED_FMT_EN_US: &str = "%a %b %-d, %Y, %r";

/// What a timestamp should read now, and when it will next need to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampLabel {
    pub text: String,
    /// The full date and time, shown on hover.
    pub title: String,
    /// `None` once the label no longer changes with time.
    pub refresh_after: Option<Duration>,
}

/// Computes the label for a message sent at `sent_at` as of `now` (both in
/// Unix milliseconds), in the time zone `tz`.
///
/// Recent messages read "now" or "N min" and refresh every minute; later
/// the same day they show the time of day and refresh hourly; older ones
/// add the weekday, the date, or the date and year, and never refresh.
pub fn extended_label<Tz>(tz: &Tz, sent_at: i64, now: i64, localizer: &dyn Localizer) -> TimestampLabel
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let (Some(sent), Some(current)) = (
        tz.timestamp_millis_opt(sent_at).single(),
        tz.timestamp_millis_opt(now).single(),
    ) else {
        return TimestampLabel { text: String::new(), title: String::new(), refresh_after: None };
    };
    let title = sent.format(EXTENDED_FMT_EN_US).to_string();
    let delta = now.saturating_sub(sent_at).max(0);
    let until_next_minute = Duration::from_millis((MINUTE_MS - delta % MINUTE_MS) as u64);

    let (text, refresh_after) = if delta < MINUTE_MS {
        (localizer.message("timestampNow", &[]), Some(until_next_minute))
    } else if delta < HOUR_MS {
        let minutes = (delta / MINUTE_MS).to_string();
        (localizer.message("timestampMinutes", &[minutes.as_str()]), Some(until_next_minute))
    } else if sent.date_naive() == current.date_naive() {
        (format_time(&sent, ""), Some(Duration::from_millis(HOUR_MS as u64)))
    } else if delta < WEEK_MS {
        (format_time(&sent, "%a "), None)
    } else if sent.year() == current.year() {
        (format_time(&sent, "%b %-d "), None)
    } else {
        (format_time(&sent, "%b %-d, %Y "), None)
    };
    TimestampLabel { text, title, refresh_after }
}

fn format_time<Tz>(dt: &DateTime<Tz>, date_prefix: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    dt.format(&format!("{date_prefix}{TIME_FMT_EN_US}")).to_string()
}

/// Keeps the `.timestamp` element under a message root current.
///
/// Like the expiration countdown, the element is looked up again on every
/// update, since a full re-render replaces it.
#[derive(Debug, Default)]
pub struct TimestampView {
    timer: Timer,
    sent_at: Option<i64>,
}

impl TimestampView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&mut self, cx: &mut Cx) {
        cx.stop_timer(self.timer);
        self.timer = Timer::empty();
    }

    /// Redraws the label for `sent_at` and schedules its next refresh, if any.
    pub fn update(&mut self, cx: &mut Cx, root: NodeId, sent_at: i64) -> Result<(), ViewError> {
        self.cancel(cx);
        self.sent_at = Some(sent_at);
        let node = cx.tree
            .find_by_class(root, "timestamp")
            .ok_or(ViewError::MissingRole("timestamp"))?;
        let label = extended_label(&Local, sent_at, cx.now_millis(), cx.localizer());
        cx.tree.set_text(node, label.text)?;
        cx.tree.set_attr(node, "title", label.title)?;
        if let Some(delay) = label.refresh_after {
            self.timer = cx.start_timeout(delay);
        }
        Ok(())
    }

    /// Refreshes the label if `event` is this view's refresh timer firing.
    /// Returns `true` if the event was consumed.
    pub fn handle_event(&mut self, cx: &mut Cx, root: NodeId, event: &Event) -> Result<bool, ViewError> {
        if !self.timer.is_event(event) {
            return Ok(false);
        }
        self.timer = Timer::empty();
        if let Some(sent_at) = self.sent_at {
            self.update(cx, root, sent_at)?;
        }
        Ok(true)
    }
}
