use super::money::Money;
use super::proposal::Proposal;
use super::{ContractId, ProjectId, ProposalId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const CONTRACT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1e_2b7c_4d0a_4c9e_9a51_2f3e_8c7d_1a01);

/// Contract ids are derived from the accepted proposal, so one proposal can
/// never produce two contracts.
pub fn contract_id_for(proposal_id: ProposalId) -> ContractId {
    Uuid::new_v5(&CONTRACT_NAMESPACE, proposal_id.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Active,
    Completed,
    Disputed,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Disputed => "disputed",
        };
        f.write_str(name)
    }
}

/// The binding agreement created when a proposal is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub project_id: ProjectId,
    pub client_id: UserId,
    pub expert_id: UserId,
    pub proposal_id: ProposalId,
    agreed_price: Money,
    pub start_date: DateTime<Utc>,
    pub status: ContractStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn from_accepted(proposal: &Proposal, client_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: contract_id_for(proposal.id),
            project_id: proposal.project_id,
            client_id,
            expert_id: proposal.expert_id,
            proposal_id: proposal.id,
            agreed_price: proposal.price,
            start_date: now,
            status: ContractStatus::Active,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fixed at acceptance time.
    pub fn agreed_price(&self) -> Money {
        self.agreed_price
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = ContractStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
