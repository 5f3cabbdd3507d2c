//! Persisted deployment records.
//!
//! A record holds the latest successful plan of a stack and a bounded history
//! of every apply attempt, successful or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::DeploymentPlan;

/// Current version of the record format.
pub const RECORD_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 50;

/// The persisted state of one stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Record format version.
    pub version: String,
    /// Stack name.
    pub stack: String,
    /// Environment name.
    pub environment: String,
    /// Latest successful plan.
    #[serde(default)]
    pub latest: Option<DeploymentPlan>,
    /// When the record was last updated.
    pub last_updated: DateTime<Utc>,
    /// Apply history (most recent last).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// A single apply attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
    /// Plan produced, if the attempt succeeded.
    #[serde(default)]
    pub plan_id: Option<Uuid>,
    /// Declaration hash at the time of the attempt.
    pub config_hash: String,
    /// Number of resources in the stack.
    pub resources: usize,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
}

impl DeploymentRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new(stack: &str, environment: &str) -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            stack: stack.to_string(),
            environment: environment.to_string(),
            latest: None,
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Stores a successful plan as the latest and logs it in the history.
    pub fn record_success(&mut self, plan: DeploymentPlan) {
        self.add_history(HistoryEntry {
            timestamp: Utc::now(),
            plan_id: Some(plan.id),
            config_hash: plan.config_hash.clone(),
            resources: plan.len(),
            success: true,
            error: None,
        });
        self.latest = Some(plan);
    }

    /// Logs a failed attempt. The latest plan is left untouched.
    pub fn record_failure(&mut self, config_hash: &str, resources: usize, error: &str) {
        self.add_history(HistoryEntry {
            timestamp: Utc::now(),
            plan_id: None,
            config_hash: config_hash.to_string(),
            resources,
            success: false,
            error: Some(error.to_string()),
        });
    }

    fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
        self.last_updated = Utc::now();
    }

    /// Returns true if the latest plan was produced from `config_hash` by the
    /// same provider at the same target.
    #[must_use]
    pub fn is_current(&self, config_hash: &str, provider: &str, target: Option<&str>) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|plan| plan.produced_by(config_hash, provider, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::SecurityConfig;

    fn plan(hash: &str) -> DeploymentPlan {
        DeploymentPlan {
            id: Uuid::new_v4(),
            stack: String::from("botpress"),
            environment: String::from("dev"),
            created_at: Utc::now(),
            config_hash: hash.to_string(),
            provider: String::from("simulated"),
            provider_target: None,
            nodes: vec![],
            access_rules: vec![],
            security: SecurityConfig::default(),
        }
    }

    #[test]
    fn test_failure_keeps_latest_plan() {
        let mut record = DeploymentRecord::new("botpress", "dev");
        record.record_success(plan("aaa"));
        record.record_failure("bbb", 3, "database: quota exceeded");

        assert!(record.is_current("aaa", "simulated", None));
        assert!(!record.is_current("bbb", "simulated", None));
        assert_eq!(record.history.len(), 2);
        assert!(!record.history[1].success);
    }

    #[test]
    fn test_provider_change_is_not_current() {
        let mut record = DeploymentRecord::new("botpress", "dev");
        record.record_success(plan("aaa"));

        assert!(!record.is_current("aaa", "http", Some("http://localhost:8080")));
        assert!(!record.is_current("aaa", "simulated", Some("http://localhost:8080")));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut record = DeploymentRecord::new("botpress", "dev");
        for i in 0..(MAX_HISTORY + 5) {
            record.record_failure(&format!("h{i}"), 0, "boom");
        }
        assert_eq!(record.history.len(), MAX_HISTORY);
        assert_eq!(record.history[0].config_hash, "h5");
    }
}
