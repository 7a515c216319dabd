//! Issue registry for persistent diagnostics
//!
//! Integrations raise issues to tell the user something needs fixing
//! (e.g. a config entry pointing at a deleted area) without failing setup.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// A raised issue, identified by (domain, issue_id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub domain: String,
    pub issue_id: String,
    pub severity: IssueSeverity,
    /// Whether the user can resolve this through a repair flow
    pub is_fixable: bool,
    /// Whether the issue survives restarts
    pub is_persistent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_key: Option<String>,
}

/// Registry of currently raised issues
pub struct IssueRegistry {
    issues: DashMap<(String, String), Issue>,
}

impl IssueRegistry {
    pub fn new() -> Self {
        Self {
            issues: DashMap::new(),
        }
    }

    /// Raise or replace an issue
    pub fn create(&self, issue: Issue) {
        info!(domain = %issue.domain, issue_id = %issue.issue_id, "issue raised");
        self.issues
            .insert((issue.domain.clone(), issue.issue_id.clone()), issue);
    }

    pub fn get(&self, domain: &str, issue_id: &str) -> Option<Issue> {
        self.issues
            .get(&(domain.to_string(), issue_id.to_string()))
            .map(|i| i.clone())
    }

    /// Clear an issue; clearing an unknown issue is a no-op
    pub fn delete(&self, domain: &str, issue_id: &str) {
        if self
            .issues
            .remove(&(domain.to_string(), issue_id.to_string()))
            .is_some()
        {
            info!(domain, issue_id, "issue cleared");
        }
    }

    pub fn for_domain(&self, domain: &str) -> Vec<Issue> {
        self.issues
            .iter()
            .filter(|i| i.key().0 == domain)
            .map(|i| i.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Default for IssueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
