//! Tunables for message views, loadable from JSON.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// The colour classes a conversation (and thus a message bubble) can carry.
pub const BUBBLE_COLORS: &[&str] = &[
    "red",
    "pink",
    "purple",
    "deep_purple",
    "indigo",
    "blue",
    "light_blue",
    "cyan",
    "teal",
    "green",
    "light_green",
    "orange",
    "deep_orange",
    "amber",
    "blue_grey",
];

/// Configuration shared by every message view in a thread.
///
/// All fields are optional in the JSON form; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessageViewConfig {
    /// How long to wait for the expiry animation before removing the view anyway.
    pub expire_failsafe_ms: u64,
    /// The shortest delay between two countdown ticks of an expiring message.
    pub min_tick_ms: u64,
    /// Into how many steps a countdown is divided, before the `min_tick_ms` floor applies.
    pub tick_divisions: u32,
    /// Colour classes that a contact colour change strips from the bubble.
    pub bubble_colors: Vec<String>,
}

impl Default for MessageViewConfig {
    fn default() -> Self {
        Self {
            expire_failsafe_ms: 1000,
            min_tick_ms: 500,
            tick_divisions: 100,
            bubble_colors: BUBBLE_COLORS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl MessageViewConfig {
    /// Parses and validates a config from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_divisions == 0 {
            return Err(ConfigError::Invalid("tick_divisions must be at least 1".into()));
        }
        Ok(())
    }

    pub fn expire_failsafe(&self) -> Duration {
        Duration::from_millis(self.expire_failsafe_ms)
    }

    /// The delay until the next countdown tick for a timer of `total` length:
    /// `max(total / tick_divisions, min_tick)`.
    pub fn tick_interval(&self, total: Duration) -> Duration {
        let step = total / self.tick_divisions.max(1);
        step.max(Duration::from_millis(self.min_tick_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(MessageViewConfig::from_json_str("{}").unwrap(), MessageViewConfig::default());
    }

    #[test]
    fn partial_json_overrides_only_given_fields() {
        let config = MessageViewConfig::from_json_str(r#"{ "expire_failsafe_ms": 250 }"#).unwrap();
        assert_eq!(config.expire_failsafe(), Duration::from_millis(250));
        assert_eq!(config.min_tick_ms, 500);
    }

    #[test]
    fn zero_divisions_is_rejected() {
        assert!(matches!(
            MessageViewConfig::from_json_str(r#"{ "tick_divisions": 0 }"#),
            Err(ConfigError::Invalid(_)),
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(MessageViewConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            MessageViewConfig::from_json_str(r#"{ "min_tick_ms": "soon" }"#),
            Err(ConfigError::Parse(_)),
        ));
    }

    #[test]
    fn tick_interval_is_floored() {
        let config = MessageViewConfig::default();
        assert_eq!(config.tick_interval(Duration::from_secs(10)), Duration::from_millis(500));
        assert_eq!(config.tick_interval(Duration::from_secs(3600)), Duration::from_secs(36));
    }
}
