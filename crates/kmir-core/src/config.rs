//! Environment-driven settings.
//!
//! The core recognizes a small set of environment variables; everything else
//! (per-agent size and refresh policies) is persisted in the store and
//! managed through the operation surface. Unset or malformed values fall
//! back to defaults rather than failing startup.

use serde::{Deserialize, Serialize};

/// Log verbosity accepted via `LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per-request traces.
    Debug,
    /// Normal operational messages.
    #[default]
    Info,
    /// Degraded-but-continuing conditions.
    Warn,
    /// Failures only.
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

/// Settings recognized by the core, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether write-side operations require a token.
    pub auth_enabled: bool,
    /// The token writes are checked against when auth is enabled.
    pub auth_token: Option<String>,
    /// Cron expression driving the scheduled sync (5-field form).
    pub sync_cron: String,
    /// IANA timezone the cron expression is evaluated in.
    pub sync_timezone: String,
    /// Sources older than this many hours are re-synced at startup.
    pub staleness_hours: u32,
    /// Whether the scheduled sync loop runs at all.
    pub sync_enabled: bool,
    /// Requested log verbosity; subscriber installation is the host's job.
    pub log_level: LogLevel,
    /// Whether the host should emit JSON logs.
    pub structured_logs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auth_enabled: false,
            auth_token: None,
            sync_cron: "0 3 * * *".to_string(),
            sync_timezone: "UTC".to_string(),
            staleness_hours: 24,
            sync_enabled: true,
            log_level: LogLevel::Info,
            structured_logs: false,
        }
    }
}

impl Settings {
    /// Resolve settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from an arbitrary key lookup (tests inject maps).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            auth_enabled: lookup("AUTH_ENABLED")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.auth_enabled),
            auth_token: lookup("AUTH_TOKEN").filter(|t| !t.trim().is_empty()),
            sync_cron: lookup("SYNC_CRON")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.sync_cron),
            sync_timezone: lookup("SYNC_TIMEZONE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.sync_timezone),
            staleness_hours: lookup("STALENESS_HOURS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.staleness_hours),
            sync_enabled: lookup("SYNC_ENABLED")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.sync_enabled),
            log_level: lookup("LOG_LEVEL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_level),
            structured_logs: lookup("STRUCTURED_LOGS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.structured_logs),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(std::string::ToString::to_string)
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let settings = Settings::from_lookup(|_| None);
        assert!(!settings.auth_enabled);
        assert_eq!(settings.sync_cron, "0 3 * * *");
        assert_eq!(settings.sync_timezone, "UTC");
        assert_eq!(settings.staleness_hours, 24);
        assert!(settings.sync_enabled);
        assert_eq!(settings.log_level, LogLevel::Info);
    }

    #[test]
    fn env_overrides_apply() {
        let map = HashMap::from([
            ("AUTH_ENABLED", "true"),
            ("AUTH_TOKEN", "secret"),
            ("SYNC_CRON", "15 4 * * 1"),
            ("SYNC_TIMEZONE", "Europe/Berlin"),
            ("STALENESS_HOURS", "6"),
            ("SYNC_ENABLED", "off"),
            ("LOG_LEVEL", "warn"),
            ("STRUCTURED_LOGS", "1"),
        ]);
        let settings = Settings::from_lookup(lookup_from(&map));
        assert!(settings.auth_enabled);
        assert_eq!(settings.auth_token.as_deref(), Some("secret"));
        assert_eq!(settings.sync_cron, "15 4 * * 1");
        assert_eq!(settings.sync_timezone, "Europe/Berlin");
        assert_eq!(settings.staleness_hours, 6);
        assert!(!settings.sync_enabled);
        assert_eq!(settings.log_level, LogLevel::Warn);
        assert!(settings.structured_logs);
    }

    #[test]
    fn malformed_values_fall_back() {
        let map = HashMap::from([
            ("AUTH_ENABLED", "maybe"),
            ("STALENESS_HOURS", "soon"),
            ("LOG_LEVEL", "chatty"),
            ("AUTH_TOKEN", "   "),
        ]);
        let settings = Settings::from_lookup(lookup_from(&map));
        assert!(!settings.auth_enabled);
        assert_eq!(settings.staleness_hours, 24);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert!(settings.auth_token.is_none());
    }
}
