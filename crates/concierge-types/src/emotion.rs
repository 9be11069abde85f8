//! Wellbeing snapshot types.
//!
//! The wellbeing handler replaces the conversation's `emotion_state` on
//! each pass; nothing else writes these fields.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Escalation ladder for wellbeing observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Nothing noteworthy.
    None,
    /// Elevated stress signals worth watching.
    Concern,
    /// Sustained distress; a supportive nudge is warranted.
    Alert,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::None => write!(f, "none"),
            AlertLevel::Concern => write!(f, "concern"),
            AlertLevel::Alert => write!(f, "alert"),
        }
    }
}

impl FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(AlertLevel::None),
            "concern" => Ok(AlertLevel::Concern),
            "alert" => Ok(AlertLevel::Alert),
            other => Err(format!("invalid alert level: '{other}'")),
        }
    }
}

impl Default for AlertLevel {
    fn default() -> Self {
        AlertLevel::None
    }
}

impl AlertLevel {
    /// Whether this level justifies interrupting the conversation with a
    /// supportive message.
    pub fn is_elevated(&self) -> bool {
        matches!(self, AlertLevel::Concern | AlertLevel::Alert)
    }
}

/// Point-in-time emotional read of the user, replaced wholesale each time
/// the wellbeing handler runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    /// -1.0 (very negative) to 1.0 (very positive).
    pub sentiment_score: f32,
    /// Dominant emotion label, free text ("calm", "frustrated", ...).
    pub emotion: String,
    /// 0.0 (relaxed) to 10.0 (overwhelmed).
    pub stress_level: f32,
    pub alert_level: AlertLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_level_roundtrip() {
        for level in [AlertLevel::None, AlertLevel::Concern, AlertLevel::Alert] {
            let s = level.to_string();
            let parsed: AlertLevel = s.parse().unwrap();
            assert_eq!(level, parsed);
        }
    }

    #[test]
    fn test_alert_level_default_is_none() {
        assert_eq!(AlertLevel::default(), AlertLevel::None);
        assert!(!AlertLevel::default().is_elevated());
    }

    #[test]
    fn test_elevated_levels() {
        assert!(AlertLevel::Concern.is_elevated());
        assert!(AlertLevel::Alert.is_elevated());
    }

    #[test]
    fn test_snapshot_serde() {
        let snapshot = EmotionSnapshot {
            sentiment_score: -0.4,
            emotion: "frustrated".to_string(),
            stress_level: 7.0,
            alert_level: AlertLevel::Concern,
            recommendations: vec!["Take a short walk".to_string()],
            recorded_at: Utc::now(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"alert_level\":\"concern\""));
        let parsed: EmotionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
