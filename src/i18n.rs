//! Localized string lookup.
//!
//! Views never hard-code user-visible text: they ask a [`Localizer`] for a
//! message by key, passing positional substitutions that replace `$1`, `$2`, ...

use tracing::debug;

/// Looks up a localized message by key.
pub trait Localizer {
    fn message(&self, key: &str, substitutions: &[&str]) -> String;
}

/// The built-in English catalogue.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishMessages;

const ENGLISH: &[(&str, &str)] = &[
    ("messageNotSent", "Message not sent."),
    ("resend", "Resend"),
    ("sessionEnded", "Secure session reset."),
    ("incomingError", "Error handling incoming message."),
    ("unregisteredUser", "Number is not registered"),
    ("sendFailed", "Send failed"),
    ("groupUpdated", "Updated the group."),
    ("titleIsNow", "Title is now '$1'."),
    ("joinedTheGroup", "$1 joined the group."),
    ("leftTheGroup", "$1 left the group."),
    ("youChangedTheTimer", "You set the timer to $1."),
    ("theyChangedTheTimer", "$1 set the timer to $2."),
    ("keychanged", "Your safety number with $1 has changed."),
    ("unknownContact", "Unknown contact"),
    ("timerOff", "off"),
    ("timerSecond", "$1 second"),
    ("timerSeconds", "$1 seconds"),
    ("timerMinute", "$1 minute"),
    ("timerMinutes", "$1 minutes"),
    ("timerHour", "$1 hour"),
    ("timerHours", "$1 hours"),
    ("timerDay", "$1 day"),
    ("timerDays", "$1 days"),
    ("timerWeek", "$1 week"),
    ("timerWeeks", "$1 weeks"),
    ("timestampNow", "now"),
    ("timestampMinutes", "$1 min"),
];

/// Replaces `$1`, `$2`, ... in `template` with the matching substitution.
///
/// Substitutions are applied from the highest index down so that `$1` never
/// clobbers the prefix of `$10`.
pub fn substitute(template: &str, substitutions: &[&str]) -> String {
    let mut out = template.to_string();
    for (i, value) in substitutions.iter().enumerate().rev() {
        out = out.replace(&format!("${}", i + 1), value);
    }
    out
}

impl Localizer for EnglishMessages {
    fn message(&self, key: &str, substitutions: &[&str]) -> String {
        match ENGLISH.iter().find(|(k, _)| *k == key) {
            Some((_, template)) => substitute(template, substitutions),
            None => {
                debug!("No English message for key {key:?}; using the key itself.");
                key.to_string()
            }
        }
    }
}

/// A human-readable name for a disappearing-messages timer of `seconds`,
/// e.g., "5 seconds", "1 hour", "1 week".
pub fn expiration_timer_name(localizer: &dyn Localizer, seconds: u64) -> String {
    const UNITS: [(u64, &str, &str); 5] = [
        (7 * 24 * 3600, "timerWeek", "timerWeeks"),
        (24 * 3600, "timerDay", "timerDays"),
        (3600, "timerHour", "timerHours"),
        (60, "timerMinute", "timerMinutes"),
        (1, "timerSecond", "timerSeconds"),
    ];
    if seconds == 0 {
        return localizer.message("timerOff", &[]);
    }
    let (size, one, many) = UNITS
        .iter()
        .copied()
        .find(|(size, ..)| seconds % size == 0)
        .unwrap_or(UNITS[4]);
    let count = seconds / size;
    let key = if count == 1 { one } else { many };
    let count = count.to_string();
    localizer.message(key, &[count.as_str()])
}
