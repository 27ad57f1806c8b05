// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Analyzing,
    Open,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    /// `true` for any status other than `resolved`; used by the dedupe check
    /// in §4.5/§8.7.
    pub fn is_active(self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(Self::New),
            "analyzing" => Some(Self::Analyzing),
            "open" => Some(Self::Open),
            "acknowledged" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Analyzing => "analyzing",
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

impl AlertSeverity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationTargets {
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A user-defined alert rule (§3). `owner_id == "global"` means visible to
/// all owners.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub topic_pattern: String,
    pub condition_code: String,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub workflow_prompt: Option<String>,
    #[serde(default)]
    pub notifications: NotificationTargets,
    pub enabled: bool,
}

/// A triggered, live alert instance (§3). Lifecycle transitions are
/// described in §4.5.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub id: String,
    pub rule_id: String,
    pub topic: String,
    pub broker_id: String,
    /// Truncated payload snippet, `<= 200` chars (§3).
    pub trigger_value: String,
    pub status: AlertStatus,
    pub handled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub analysis_result: Option<String>,
}

/// Truncate a payload to the `<= 200` char snippet §3 requires for
/// `trigger_value`, respecting UTF-8 boundaries.
pub fn truncate_snippet(payload_text: &str, max_chars: usize) -> String {
    if payload_text.chars().count() <= max_chars {
        payload_text.to_string()
    } else {
        payload_text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_status_excludes_only_resolved() {
        assert!(AlertStatus::New.is_active());
        assert!(AlertStatus::Analyzing.is_active());
        assert!(AlertStatus::Open.is_active());
        assert!(AlertStatus::Acknowledged.is_active());
        assert!(!AlertStatus::Resolved.is_active());
    }

    #[test]
    fn truncate_snippet_respects_limit() {
        let long = "x".repeat(300);
        assert_eq!(truncate_snippet(&long, 200).chars().count(), 200);
    }

    #[test]
    fn truncate_snippet_leaves_short_untouched() {
        assert_eq!(truncate_snippet("short", 200), "short");
    }

    #[test]
    fn parse_round_trips_known_statuses() {
        for raw in ["new", "analyzing", "open", "acknowledged", "resolved"] {
            assert!(AlertStatus::parse(raw).is_some());
        }
        assert!(AlertStatus::parse("bogus").is_none());
    }

    #[test]
    fn status_as_str_round_trips_through_parse() {
        for status in [
            AlertStatus::New,
            AlertStatus::Analyzing,
            AlertStatus::Open,
            AlertStatus::Acknowledged,
            AlertStatus::Resolved,
        ] {
            assert_eq!(AlertStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn severity_as_str_round_trips_through_parse() {
        for severity in [
            AlertSeverity::Info,
            AlertSeverity::Warning,
            AlertSeverity::Critical,
        ] {
            assert_eq!(AlertSeverity::parse(severity.as_str()), Some(severity));
        }
    }
}
