//! Engine configuration.
//!
//! The nurturing configuration is a single JSON document loaded once at
//! startup and passed immutably into the engine. Every section the cycle
//! depends on is validated up front — a bad schedule or keyword list fails
//! construction, never a running cycle.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::templates::TemplateSet;

/// Follow-up timing: day offsets measured from the last outbound contact,
/// strictly ascending, fired in index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpSchedule {
    /// Days after `last_contacted_at` at which follow-up N becomes due.
    pub offsets_days: Vec<u32>,
    /// Hard cap on follow-ups per lead.
    pub max_follow_ups: u32,
}

impl FollowUpSchedule {
    /// The last offset that can actually fire given `max_follow_ups`.
    pub fn last_offset_days(&self) -> u32 {
        self.offsets_days[(self.max_follow_ups as usize).saturating_sub(1)]
    }
}

/// Phrase lists driving reply classification. No vocabulary is hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseKeywords {
    pub interested: Vec<String>,
    pub not_interested: Vec<String>,
}

/// Per-event score deltas. Supplied, not defaulted — the scoring table is
/// operator policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringDeltas {
    pub response_received: i64,
    pub interest_detected: i64,
    pub not_interested_detected: i64,
    pub follow_up_sent: i64,
}

/// Settings consumed by the external trigger, not the engine itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// How often the `watch` loop runs a cycle.
    pub check_responses_interval_hours: u32,
}

/// Immutable engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurtureConfig {
    pub follow_up_schedule: FollowUpSchedule,
    pub response_keywords: ResponseKeywords,
    pub lead_scoring: ScoringDeltas,
    pub automation: AutomationConfig,
    #[serde(default)]
    pub templates: TemplateSet,
}

impl NurtureConfig {
    /// Load and validate a configuration document.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::MissingRequired {
                    key: path.display().to_string(),
                    hint: "Create a nurturing config file (see nurture.example.json)".into(),
                }
            } else {
                ConfigError::Io(e)
            }
        })?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section the cycle depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.follow_up_schedule;

        if schedule.offsets_days.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "follow_up_schedule.offsets_days".into(),
                message: "at least one offset is required".into(),
            });
        }
        if schedule.offsets_days.iter().any(|&d| d == 0) {
            return Err(ConfigError::InvalidValue {
                key: "follow_up_schedule.offsets_days".into(),
                message: "offsets must be at least 1 day".into(),
            });
        }
        if !schedule.offsets_days.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError::InvalidValue {
                key: "follow_up_schedule.offsets_days".into(),
                message: "offsets must be strictly ascending".into(),
            });
        }
        if schedule.max_follow_ups == 0
            || schedule.max_follow_ups as usize > schedule.offsets_days.len()
        {
            return Err(ConfigError::InvalidValue {
                key: "follow_up_schedule.max_follow_ups".into(),
                message: format!(
                    "must be between 1 and the number of offsets ({})",
                    schedule.offsets_days.len()
                ),
            });
        }

        let keywords = &self.response_keywords;
        if keywords.interested.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "response_keywords.interested".into(),
                message: "at least one non-empty phrase is required".into(),
            });
        }
        if keywords.not_interested.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "response_keywords.not_interested".into(),
                message: "at least one non-empty phrase is required".into(),
            });
        }

        if (self.templates.follow_ups.len() as u32) < schedule.max_follow_ups {
            return Err(ConfigError::InvalidValue {
                key: "templates.follow_ups".into(),
                message: format!(
                    "{} follow-up template(s) for max_follow_ups = {}",
                    self.templates.follow_ups.len(),
                    schedule.max_follow_ups
                ),
            });
        }

        if self.automation.check_responses_interval_hours == 0 {
            return Err(ConfigError::InvalidValue {
                key: "automation.check_responses_interval_hours".into(),
                message: "interval must be at least 1 hour".into(),
            });
        }

        Ok(())
    }
}
