use super::guards::{require_admin, require_ownership, require_role};
use super::notifications::NotificationDispatcher;
use crate::domain::contract::{Contract, ContractStatus};
use crate::domain::money::Money;
use crate::domain::notification::Notice;
use crate::domain::ports::MarketStoreHandle;
use crate::domain::project::{Project, ProjectCategory, ProjectStatus};
use crate::domain::proposal::{Proposal, ProposalStats, ProposalStatus};
use crate::domain::store::{
    ChangeSet, Precondition, ProjectFilter, ProposalFilter, Record, RecordKey,
};
use crate::domain::user::{Actor, Role};
use crate::domain::{ContractId, ProjectId, ProposalId};
use crate::error::{MarketError, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewProject {
    pub id: Option<ProjectId>,
    pub title: String,
    pub description: String,
    pub category: ProjectCategory,
    pub budget: Option<Money>,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewProposal {
    pub id: Option<ProposalId>,
    pub project_id: ProjectId,
    pub price: Money,
    pub estimated_days: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub project: Project,
    pub rejected_proposals: Vec<ProposalId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub proposal: Proposal,
    pub contract: Contract,
    pub project: Project,
    pub rejected_proposals: Vec<ProposalId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub contract: Contract,
    pub project: Project,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalListing {
    pub proposals: Vec<Proposal>,
    pub stats: ProposalStats,
}

/// Projects, proposals and contracts: the path from a posted project to
/// completed work.
///
/// Every transition is a single guarded commit, so two callers racing on the
/// same project cannot both win: the loser's preconditions fail and it gets
/// `Conflict`.
#[derive(Clone)]
pub struct ContractWorkflow {
    store: MarketStoreHandle,
    notifier: NotificationDispatcher,
}

impl ContractWorkflow {
    pub fn new(store: MarketStoreHandle, notifier: NotificationDispatcher) -> Self {
        Self { store, notifier }
    }

    async fn load_project(&self, id: ProjectId) -> Result<Project> {
        self.store
            .project(id)
            .await?
            .ok_or_else(|| MarketError::not_found("project", id))
    }

    async fn load_proposal(&self, id: ProposalId) -> Result<Proposal> {
        self.store
            .proposal(id)
            .await?
            .ok_or_else(|| MarketError::not_found("proposal", id))
    }

    async fn load_contract(&self, id: ContractId) -> Result<Contract> {
        self.store
            .contract(id)
            .await?
            .ok_or_else(|| MarketError::not_found("contract", id))
    }

    pub async fn post_project(&self, actor: &Actor, new: NewProject) -> Result<Project> {
        require_role(actor, Role::Client)?;
        let title = new.title.trim();
        if title.is_empty() {
            return Err(MarketError::BadRequest("project title is required".to_string()));
        }
        if let Some(budget) = new.budget
            && !budget.is_positive()
        {
            return Err(MarketError::BadRequest(format!(
                "budget {budget} must be positive"
            )));
        }

        let now = Utc::now();
        let project = Project {
            id: new.id.unwrap_or_else(Uuid::new_v4),
            title: title.to_string(),
            description: new.description,
            category: new.category,
            budget: new.budget,
            deadline: new.deadline,
            status: ProjectStatus::Open,
            owner_id: actor.user_id,
            created_at: now,
            updated_at: now,
        };
        self.store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::Absent(RecordKey::Project(project.id)))
                    .put(Record::Project(project.clone())),
            )
            .await?;

        info!(project_id = %project.id, owner_id = %actor.user_id, "project posted");
        Ok(project)
    }

    /// Closes an open project and turns down every proposal still waiting on it.
    pub async fn cancel_project(
        &self,
        actor: &Actor,
        project_id: ProjectId,
    ) -> Result<Cancellation> {
        let mut project = self.load_project(project_id).await?;
        if actor.role != Role::Admin {
            require_ownership(actor, project.owner_id, "project")?;
        }
        let now = Utc::now();
        project.transition(ProjectStatus::Cancelled, now)?;

        let receipt = self
            .store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::ProjectStatus {
                        id: project.id,
                        expected: ProjectStatus::Open,
                    })
                    .put(Record::Project(project.clone()))
                    .reject_sent_proposals(project.id, None, now),
            )
            .await?;

        info!(
            %project_id,
            rejected = receipt.rejected_proposals.len(),
            "project cancelled"
        );
        Ok(Cancellation {
            project,
            rejected_proposals: receipt.rejected_proposals,
        })
    }

    pub async fn create_proposal(&self, actor: &Actor, new: NewProposal) -> Result<Proposal> {
        require_role(actor, Role::Expert)?;
        if !new.price.is_positive() {
            return Err(MarketError::BadRequest(format!(
                "price {} must be positive",
                new.price
            )));
        }
        if new.estimated_days == 0 {
            return Err(MarketError::BadRequest(
                "estimated_days must be at least 1".to_string(),
            ));
        }

        let project = self.load_project(new.project_id).await?;
        if project.status != ProjectStatus::Open {
            return Err(MarketError::conflict(format!(
                "project {} is {} and no longer takes proposals",
                project.id, project.status
            )));
        }
        let existing = self
            .store
            .proposals(&ProposalFilter {
                project_id: Some(project.id),
                expert_id: Some(actor.user_id),
                status: None,
            })
            .await?;
        if let Some(live) = existing.iter().find(|p| p.is_live()) {
            return Err(MarketError::conflict_with(
                "expert already has a live proposal on this project",
                live.id,
            ));
        }

        let now = Utc::now();
        let proposal = Proposal {
            id: new.id.unwrap_or_else(Uuid::new_v4),
            project_id: project.id,
            expert_id: actor.user_id,
            price: new.price,
            estimated_days: new.estimated_days,
            message: new.message,
            status: ProposalStatus::Sent,
            created_at: now,
            updated_at: now,
        };
        self.store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::ProjectStatus {
                        id: project.id,
                        expected: ProjectStatus::Open,
                    })
                    .expect(Precondition::NoLiveProposal {
                        project_id: project.id,
                        expert_id: actor.user_id,
                    })
                    .expect(Precondition::Absent(RecordKey::Proposal(proposal.id)))
                    .put(Record::Proposal(proposal.clone())),
            )
            .await?;

        info!(
            proposal_id = %proposal.id,
            project_id = %project.id,
            price = %proposal.price,
            "proposal sent"
        );
        self.notifier.notify(Notice::new_proposal(
            project.owner_id,
            actor.user_id,
            project.id,
            &project.title,
        ));
        Ok(proposal)
    }

    /// Accepts one proposal: creates the contract, starts the project and
    /// rejects every competing proposal in one atomic commit.
    pub async fn accept(&self, actor: &Actor, proposal_id: ProposalId) -> Result<Acceptance> {
        let mut proposal = self.load_proposal(proposal_id).await?;
        let mut project = self.load_project(proposal.project_id).await?;
        require_ownership(actor, project.owner_id, "project")?;
        if proposal.status != ProposalStatus::Sent {
            return Err(MarketError::conflict(format!(
                "proposal {proposal_id} is already {}",
                proposal.status
            )));
        }
        if project.status != ProjectStatus::Open {
            return Err(MarketError::conflict(format!(
                "project {} is {}",
                project.id, project.status
            )));
        }

        let now = Utc::now();
        proposal.decide(ProposalStatus::Accepted, now);
        project.transition(ProjectStatus::InProgress, now)?;
        let contract = Contract::from_accepted(&proposal, project.owner_id, now);

        let receipt = self
            .store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::ProposalStatus {
                        id: proposal.id,
                        expected: ProposalStatus::Sent,
                    })
                    .expect(Precondition::ProjectStatus {
                        id: project.id,
                        expected: ProjectStatus::Open,
                    })
                    .expect(Precondition::Absent(RecordKey::Contract(contract.id)))
                    .put(Record::Proposal(proposal.clone()))
                    .put(Record::Contract(contract.clone()))
                    .put(Record::Project(project.clone()))
                    .reject_sent_proposals(project.id, Some(proposal.id), now),
            )
            .await?;

        info!(
            %proposal_id,
            contract_id = %contract.id,
            agreed_price = %contract.agreed_price(),
            rejected = receipt.rejected_proposals.len(),
            "proposal accepted"
        );
        self.notifier.notify(Notice::proposal_accepted(
            proposal.expert_id,
            project.id,
            &project.title,
        ));
        Ok(Acceptance {
            proposal,
            contract,
            project,
            rejected_proposals: receipt.rejected_proposals,
        })
    }

    pub async fn reject(&self, actor: &Actor, proposal_id: ProposalId) -> Result<Proposal> {
        let mut proposal = self.load_proposal(proposal_id).await?;
        let project = self.load_project(proposal.project_id).await?;
        require_ownership(actor, project.owner_id, "project")?;
        if proposal.status != ProposalStatus::Sent {
            return Err(MarketError::conflict(format!(
                "proposal {proposal_id} is already {}",
                proposal.status
            )));
        }
        if project.status != ProjectStatus::Open {
            return Err(MarketError::conflict(format!(
                "project {} is {}",
                project.id, project.status
            )));
        }

        proposal.decide(ProposalStatus::Rejected, Utc::now());
        self.store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::ProposalStatus {
                        id: proposal.id,
                        expected: ProposalStatus::Sent,
                    })
                    .put(Record::Proposal(proposal.clone())),
            )
            .await?;

        info!(%proposal_id, "proposal rejected");
        Ok(proposal)
    }

    pub async fn complete(&self, actor: &Actor, contract_id: ContractId) -> Result<Completion> {
        let contract = self.load_contract(contract_id).await?;
        require_ownership(actor, contract.client_id, "contract")?;
        self.finish(contract).await
    }

    /// Administrative override of [`ContractWorkflow::complete`] that skips
    /// the client ownership check.
    pub async fn force_complete(
        &self,
        actor: &Actor,
        contract_id: ContractId,
    ) -> Result<Completion> {
        require_admin(actor)?;
        let contract = self.load_contract(contract_id).await?;
        warn!(
            %contract_id,
            operator_id = %actor.user_id,
            client_id = %contract.client_id,
            "contract force-completed by administrator"
        );
        self.finish(contract).await
    }

    async fn finish(&self, mut contract: Contract) -> Result<Completion> {
        if contract.status != ContractStatus::Active {
            return Err(MarketError::conflict(format!(
                "contract {} is {}",
                contract.id, contract.status
            )));
        }
        let mut project = self.load_project(contract.project_id).await?;
        if project.status != ProjectStatus::InProgress {
            return Err(MarketError::conflict(format!(
                "project {} is {}",
                project.id, project.status
            )));
        }

        let now = Utc::now();
        contract.complete(now);
        project.transition(ProjectStatus::Completed, now)?;
        self.store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::ContractStatus {
                        id: contract.id,
                        expected: ContractStatus::Active,
                    })
                    .expect(Precondition::ProjectStatus {
                        id: project.id,
                        expected: ProjectStatus::InProgress,
                    })
                    .put(Record::Contract(contract.clone()))
                    .put(Record::Project(project.clone())),
            )
            .await?;

        info!(contract_id = %contract.id, project_id = %project.id, "contract completed");
        self.notifier.notify(Notice::review_request(
            contract.client_id,
            project.id,
            &project.title,
        ));
        Ok(Completion { contract, project })
    }

    /// Proposals visible to the actor: a client sees bids on their own
    /// projects, an expert their own bids, an admin everything.
    pub async fn list_proposals(
        &self,
        actor: &Actor,
        project_id: Option<ProjectId>,
    ) -> Result<ProposalListing> {
        let proposals = match actor.role {
            Role::Admin => {
                self.store
                    .proposals(&ProposalFilter {
                        project_id,
                        ..Default::default()
                    })
                    .await?
            }
            Role::Expert => {
                self.store
                    .proposals(&ProposalFilter {
                        project_id,
                        expert_id: Some(actor.user_id),
                        status: None,
                    })
                    .await?
            }
            Role::Client => match project_id {
                Some(project_id) => {
                    let project = self.load_project(project_id).await?;
                    require_ownership(actor, project.owner_id, "project")?;
                    self.store
                        .proposals(&ProposalFilter {
                            project_id: Some(project_id),
                            ..Default::default()
                        })
                        .await?
                }
                None => {
                    let owned = self
                        .store
                        .projects(&ProjectFilter {
                            owner_id: Some(actor.user_id),
                            status: None,
                        })
                        .await?;
                    let mut proposals = Vec::new();
                    for project in owned {
                        proposals.extend(
                            self.store
                                .proposals(&ProposalFilter {
                                    project_id: Some(project.id),
                                    ..Default::default()
                                })
                                .await?,
                        );
                    }
                    proposals.sort_by_key(|p| std::cmp::Reverse(p.created_at));
                    proposals
                }
            },
        };

        let stats = ProposalStats::tally(&proposals);
        Ok(ProposalListing { proposals, stats })
    }
}
