use super::money::Money;
use super::{ProjectId, ProposalId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Sent,
    Accepted,
    Rejected,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalStatus::Sent => "sent",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// An expert's bid on an open project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub project_id: ProjectId,
    pub expert_id: UserId,
    pub price: Money,
    pub estimated_days: u32,
    pub message: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    /// A proposal blocks further bids from the same expert until it is rejected.
    pub fn is_live(&self) -> bool {
        self.status != ProposalStatus::Rejected
    }

    pub fn decide(&mut self, status: ProposalStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProposalStats {
    pub total_proposals: usize,
    pub sent_proposals: usize,
    pub accepted_proposals: usize,
    pub rejected_proposals: usize,
}

impl ProposalStats {
    pub fn tally<'a>(proposals: impl IntoIterator<Item = &'a Proposal>) -> Self {
        proposals
            .into_iter()
            .fold(ProposalStats::default(), |mut stats, p| {
                stats.total_proposals += 1;
                match p.status {
                    ProposalStatus::Sent => stats.sent_proposals += 1,
                    ProposalStatus::Accepted => stats.accepted_proposals += 1,
                    ProposalStatus::Rejected => stats.rejected_proposals += 1,
                }
                stats
            })
    }
}
