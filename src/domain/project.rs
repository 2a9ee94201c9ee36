use super::money::Money;
use super::{ProjectId, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCategory {
    Billing,
    HumanResources,
    Sales,
    Marketing,
    Operations,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    /// Projects only move forward: open -> in_progress -> completed, or open -> cancelled.
    pub fn can_transition_to(self, next: ProjectStatus) -> bool {
        matches!(
            (self, next),
            (ProjectStatus::Open, ProjectStatus::InProgress)
                | (ProjectStatus::InProgress, ProjectStatus::Completed)
                | (ProjectStatus::Open, ProjectStatus::Cancelled)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectStatus::Open => "open",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A unit of work posted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub description: String,
    pub category: ProjectCategory,
    pub budget: Option<Money>,
    pub deadline: Option<NaiveDate>,
    pub status: ProjectStatus,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn transition(&mut self, next: ProjectStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(MarketError::conflict(format!(
                "project {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn project(status: ProjectStatus) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            title: "Invoice OCR".to_string(),
            description: "Extract totals from PDFs".to_string(),
            category: ProjectCategory::Billing,
            budget: None,
            deadline: None,
            status,
            owner_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_forward_transitions() {
        let mut p = project(ProjectStatus::Open);
        p.transition(ProjectStatus::InProgress, Utc::now()).unwrap();
        p.transition(ProjectStatus::Completed, Utc::now()).unwrap();
        assert_eq!(p.status, ProjectStatus::Completed);
    }

    #[test]
    fn test_no_reopening_after_completion() {
        let mut p = project(ProjectStatus::Completed);
        let result = p.transition(ProjectStatus::Open, Utc::now());
        assert!(matches!(result, Err(MarketError::Conflict { .. })));
        assert!(!ProjectStatus::Completed.can_transition_to(ProjectStatus::InProgress));
        assert!(!ProjectStatus::InProgress.can_transition_to(ProjectStatus::Cancelled));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ProjectStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let category: ProjectCategory = serde_json::from_str("\"human_resources\"").unwrap();
        assert_eq!(category, ProjectCategory::HumanResources);
    }
}
