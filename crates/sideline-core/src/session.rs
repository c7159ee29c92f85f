use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ids::SessionId;

/// Sports the detector knows how to track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Basketball,
    Tennis,
    Soccer,
    Golf,
}

impl Sport {
    pub const ALL: [Sport; 4] = [Sport::Basketball, Sport::Tennis, Sport::Soccer, Sport::Golf];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basketball => "basketball",
            Self::Tennis => "tennis",
            Self::Soccer => "soccer",
            Self::Golf => "golf",
        }
    }
}

impl std::fmt::Display for Sport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sport {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basketball" => Ok(Self::Basketball),
            "tennis" => Ok(Self::Tennis),
            // "football" is accepted upstream as an alias
            "soccer" | "football" => Ok(Self::Soccer),
            "golf" => Ok(Self::Golf),
            other => Err(format!("unknown sport: {other}")),
        }
    }
}

/// A tracking session as the server last reported it.
///
/// The accumulated totals are server-side values; live per-run aggregation
/// happens in [`Stats`] and is never written back into this record locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub sport: Sport,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub target_actions: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub total_actions: u64,
    #[serde(default)]
    pub successful_actions: u64,
    #[serde(default)]
    pub average_confidence: f64,
}

/// Request body for creating a session. The server assigns the id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionDraft {
    pub sport: Sport,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub target_actions: u32,
}

/// Whether the detector is running for the current session.
///
/// Only `start_tracking` / `stop_tracking` may move this machine; inbound
/// events never touch it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Liveness of the push-event channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Running aggregates over ingested detection events for one tracking run.
///
/// All four fields derive from one prior value and commit together; readers
/// never observe `total_actions` bumped while `success_rate` is stale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_actions: u64,
    pub successful_actions: u64,
    pub success_rate: f64,
    pub average_score: f64,
}

impl Stats {
    /// Fold one detection into the aggregates, producing the next value.
    ///
    /// The incremental mean reads the *previous* total, so two events applied
    /// back-to-back each build on the other's result regardless of when any
    /// observer last looked.
    #[must_use]
    pub fn record(&self, successful: bool, confidence: f64) -> Stats {
        let total = self.total_actions + 1;
        let successes = self.successful_actions + u64::from(successful);
        Stats {
            total_actions: total,
            successful_actions: successes,
            success_rate: successes as f64 / total as f64 * 100.0,
            average_score: (self.average_score * self.total_actions as f64 + confidence)
                / total as f64,
        }
    }
}

/// Detection/feedback parameters, opaque beyond shallow-merge semantics.
///
/// Top-level keys merge wholesale: an incoming per-sport sub-map replaces the
/// existing one, it is not merged recursively. No schema validation is
/// performed on incoming keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    pub entries: Map<String, Value>,
}

impl Settings {
    pub fn empty() -> Self {
        Self { entries: Map::new() }
    }

    /// Shallow-merge `partial` into these settings, last write wins per key.
    pub fn merge(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            let _ = self.entries.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }
}

impl Default for Settings {
    /// Detection defaults mirrored from the detector's own configuration.
    fn default() -> Self {
        let mut entries = Map::new();
        let _ = entries.insert("min_detection_confidence".into(), json!(0.5));
        let _ = entries.insert("min_tracking_confidence".into(), json!(0.5));
        let _ = entries.insert("feedback_enabled".into(), json!(true));
        let _ = entries.insert(
            "sport_configs".into(),
            json!({
                "basketball": { "shot_detection_threshold": 0.8 },
                "tennis": { "serve_detection_threshold": 0.7 },
                "soccer": { "kick_detection_threshold": 0.6 },
                "golf": { "swing_detection_threshold": 0.8 },
            }),
        );
        Self { entries }
    }
}
