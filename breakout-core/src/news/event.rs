//! News events and avoidance settings.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event impact. Only `High` events gate trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    #[default]
    High,
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

impl Impact {
    pub fn is_high(self) -> bool {
        self == Impact::High
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Impact::High => "high",
            Impact::Medium => "medium",
            Impact::Low => "low",
            Impact::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Impact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Impact::High),
            "medium" => Ok(Impact::Medium),
            "low" => Ok(Impact::Low),
            other => Err(format!("unknown impact '{other}' (expected high, medium or low)")),
        }
    }
}

/// A scheduled economic release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsEvent {
    pub id: u64,
    pub title: String,
    /// Upper-case ISO currency code, e.g. `USD`.
    pub currency: String,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub impact: Impact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewsEvent {
    pub fn summary(&self, now: DateTime<Utc>) -> EventSummary {
        EventSummary {
            id: self.id,
            title: self.title.clone(),
            currency: self.currency.clone(),
            event_time: self.event_time,
            minutes_until: (self.event_time - now).num_minutes(),
        }
    }
}

/// Event details attached to a decision.
///
/// `minutes_until` is negative for events in the past.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: u64,
    pub title: String,
    pub currency: String,
    pub event_time: DateTime<Utc>,
    pub minutes_until: i64,
}

impl EventSummary {
    pub fn minutes_ago(&self) -> i64 {
        -self.minutes_until
    }
}

/// Avoidance windows, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsSettings {
    /// Block new entries this long before an event.
    #[serde(default = "default_minutes_before")]
    pub minutes_before: u32,
    /// Keep blocking this long after an event.
    #[serde(default = "default_minutes_after")]
    pub minutes_after: u32,
    /// Close open positions this long before an event.
    #[serde(default = "default_minutes_before_close")]
    pub minutes_before_close: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_minutes_before() -> u32 {
    30
}

fn default_minutes_after() -> u32 {
    60
}

fn default_minutes_before_close() -> u32 {
    3
}

fn default_enabled() -> bool {
    true
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            minutes_before: default_minutes_before(),
            minutes_after: default_minutes_after(),
            minutes_before_close: default_minutes_before_close(),
            enabled: default_enabled(),
        }
    }
}

/// Partial settings update; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub minutes_before: Option<u32>,
    pub minutes_after: Option<u32>,
    pub minutes_before_close: Option<u32>,
    pub enabled: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }

    pub fn apply(&self, settings: NewsSettings) -> NewsSettings {
        NewsSettings {
            minutes_before: self.minutes_before.unwrap_or(settings.minutes_before),
            minutes_after: self.minutes_after.unwrap_or(settings.minutes_after),
            minutes_before_close: self
                .minutes_before_close
                .unwrap_or(settings.minutes_before_close),
            enabled: self.enabled.unwrap_or(settings.enabled),
        }
    }
}

/// Request to add an event; the store assigns the id and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEventRequest {
    pub title: String,
    pub currency: String,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub impact: Impact,
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts `Z`, explicit offsets, and naive timestamps (taken as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 11, 20, 13, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-11-20T13:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-20T13:30:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-20T08:30:00-05:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-20T13:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-20 13:30:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-20T13:30"), Some(expected));
        assert_eq!(parse_timestamp("next tuesday"), None);
    }

    #[test]
    fn impact_parsing_and_unknown_values() {
        assert_eq!("HIGH".parse::<Impact>().unwrap(), Impact::High);
        assert!("severe".parse::<Impact>().is_err());
        let impact: Impact = serde_json::from_str("\"severe\"").unwrap();
        assert_eq!(impact, Impact::Unknown);
        assert!(!impact.is_high());
    }

    #[test]
    fn settings_defaults_and_partial_patch() {
        let defaults = NewsSettings::default();
        assert_eq!(defaults.minutes_before, 30);
        assert_eq!(defaults.minutes_after, 60);
        assert_eq!(defaults.minutes_before_close, 3);
        assert!(defaults.enabled);

        let patch = SettingsPatch {
            minutes_after: Some(45),
            enabled: Some(false),
            ..Default::default()
        };
        let updated = patch.apply(defaults);
        assert_eq!(updated.minutes_before, 30);
        assert_eq!(updated.minutes_after, 45);
        assert!(!updated.enabled);
        assert!(SettingsPatch::default().is_empty());
    }

    #[test]
    fn settings_fill_missing_fields() {
        let s: NewsSettings = serde_json::from_str(r#"{"minutes_before": 15}"#).unwrap();
        assert_eq!(s.minutes_before, 15);
        assert_eq!(s.minutes_after, 60);
        assert!(s.enabled);
    }
}
