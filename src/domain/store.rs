//! Vocabulary shared by every `MarketStore` adapter: records, filters and
//! the guarded change sets that make each state transition atomic.

use super::contract::{Contract, ContractStatus};
use super::conversation::{Conversation, Message};
use super::invoice::Invoice;
use super::ledger::HoldRef;
use super::notification::Notification;
use super::payment::{Payment, PaymentStatus};
use super::project::{Project, ProjectStatus};
use super::proposal::{Proposal, ProposalStatus};
use super::user::UserProfile;
use super::{ContractId, ConversationId, PaymentId, ProjectId, ProposalId, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum Record {
    User(UserProfile),
    Project(Project),
    Proposal(Proposal),
    Contract(Contract),
    Payment(Payment),
    Invoice(Invoice),
    Notification(Notification),
    Conversation(Conversation),
    Message(Message),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    User(Uuid),
    Project(Uuid),
    Proposal(Uuid),
    Contract(Uuid),
    Payment(Uuid),
    Invoice(Uuid),
    Notification(Uuid),
    Conversation(Uuid),
    Message(Uuid),
}

impl RecordKey {
    pub fn table(&self) -> &'static str {
        match self {
            RecordKey::User(_) => "users",
            RecordKey::Project(_) => "projects",
            RecordKey::Proposal(_) => "proposals",
            RecordKey::Contract(_) => "contracts",
            RecordKey::Payment(_) => "payments",
            RecordKey::Invoice(_) => "invoices",
            RecordKey::Notification(_) => "notifications",
            RecordKey::Conversation(_) => "conversations",
            RecordKey::Message(_) => "messages",
        }
    }

    pub fn id(&self) -> Uuid {
        match *self {
            RecordKey::User(id)
            | RecordKey::Project(id)
            | RecordKey::Proposal(id)
            | RecordKey::Contract(id)
            | RecordKey::Payment(id)
            | RecordKey::Invoice(id)
            | RecordKey::Notification(id)
            | RecordKey::Conversation(id)
            | RecordKey::Message(id) => id,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table(), self.id())
    }
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::User(r) => RecordKey::User(r.id),
            Record::Project(r) => RecordKey::Project(r.id),
            Record::Proposal(r) => RecordKey::Proposal(r.id),
            Record::Contract(r) => RecordKey::Contract(r.id),
            Record::Payment(r) => RecordKey::Payment(r.id),
            Record::Invoice(r) => RecordKey::Invoice(r.id),
            Record::Notification(r) => RecordKey::Notification(r.id),
            Record::Conversation(r) => RecordKey::Conversation(r.id),
            Record::Message(r) => RecordKey::Message(r.id),
        }
    }
}

/// A condition that must hold at commit time for the change set to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    ProjectStatus { id: ProjectId, expected: ProjectStatus },
    ProposalStatus { id: ProposalId, expected: ProposalStatus },
    ContractStatus { id: ContractId, expected: ContractStatus },
    PaymentStatus { id: PaymentId, expected: PaymentStatus },
    /// Compare-and-swap on the reservation token of a payment.
    PaymentReservation { id: PaymentId, expected: Option<Uuid> },
    Absent(RecordKey),
    NoLiveProposal { project_id: ProjectId, expert_id: UserId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put(Record),
    /// Conditional bulk update: every `sent` proposal on the project other
    /// than `except` becomes `rejected`.
    RejectSentProposals {
        project_id: ProjectId,
        except: Option<ProposalId>,
        at: DateTime<Utc>,
    },
    MarkNotificationsRead { recipient_id: UserId },
}

/// All the writes of one state transition. Applied entirely or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub preconditions: Vec<Precondition>,
    pub mutations: Vec<Mutation>,
}

/// What a commit did beyond the explicit puts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub rejected_proposals: Vec<ProposalId>,
    pub notifications_marked_read: usize,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn put(mut self, record: Record) -> Self {
        self.mutations.push(Mutation::Put(record));
        self
    }

    pub fn reject_sent_proposals(
        mut self,
        project_id: ProjectId,
        except: Option<ProposalId>,
        at: DateTime<Utc>,
    ) -> Self {
        self.mutations.push(Mutation::RejectSentProposals {
            project_id,
            except,
            at,
        });
        self
    }

    pub fn mark_notifications_read(mut self, recipient_id: UserId) -> Self {
        self.mutations
            .push(Mutation::MarkNotificationsRead { recipient_id });
        self
    }

    /// Checks every precondition against `view` and expands bulk mutations
    /// into concrete rows. Adapters call this while holding their commit
    /// lock and then persist the returned rows in one write.
    pub fn resolve(self, view: &impl RecordView) -> Result<(Vec<Record>, CommitReceipt)> {
        for precondition in &self.preconditions {
            precondition.check(view)?;
        }

        let mut receipt = CommitReceipt::default();
        let mut rows: Vec<Record> = Vec::new();
        let mut explicit: HashMap<RecordKey, usize> = HashMap::new();

        for mutation in self.mutations {
            match mutation {
                Mutation::Put(record) => {
                    let key = record.key();
                    match explicit.get(&key) {
                        Some(&index) => rows[index] = record,
                        None => {
                            explicit.insert(key, rows.len());
                            rows.push(record);
                        }
                    }
                }
                Mutation::RejectSentProposals {
                    project_id,
                    except,
                    at,
                } => {
                    for mut proposal in view.proposals_on(project_id)? {
                        if proposal.status != ProposalStatus::Sent
                            || Some(proposal.id) == except
                            || explicit.contains_key(&RecordKey::Proposal(proposal.id))
                        {
                            continue;
                        }
                        proposal.decide(ProposalStatus::Rejected, at);
                        receipt.rejected_proposals.push(proposal.id);
                        explicit.insert(RecordKey::Proposal(proposal.id), rows.len());
                        rows.push(Record::Proposal(proposal));
                    }
                }
                Mutation::MarkNotificationsRead { recipient_id } => {
                    for mut notification in view.notifications_for(recipient_id)? {
                        if notification.read {
                            continue;
                        }
                        notification.read = true;
                        receipt.notifications_marked_read += 1;
                        explicit.insert(RecordKey::Notification(notification.id), rows.len());
                        rows.push(Record::Notification(notification));
                    }
                }
            }
        }

        Ok((rows, receipt))
    }
}

/// Read access to the committed state, as seen from inside a commit.
pub trait RecordView {
    fn load(&self, key: RecordKey) -> Result<Option<Record>>;
    fn proposals_on(&self, project_id: ProjectId) -> Result<Vec<Proposal>>;
    fn notifications_for(&self, recipient_id: UserId) -> Result<Vec<Notification>>;
}

impl Precondition {
    pub fn check(&self, view: &impl RecordView) -> Result<()> {
        match self {
            Precondition::ProjectStatus { id, expected } => {
                match view.load(RecordKey::Project(*id))? {
                    Some(Record::Project(p)) if p.status == *expected => Ok(()),
                    Some(Record::Project(p)) => Err(MarketError::conflict(format!(
                        "project {id} is {} (expected {expected})",
                        p.status
                    ))),
                    _ => Err(MarketError::not_found("project", id)),
                }
            }
            Precondition::ProposalStatus { id, expected } => {
                match view.load(RecordKey::Proposal(*id))? {
                    Some(Record::Proposal(p)) if p.status == *expected => Ok(()),
                    Some(Record::Proposal(p)) => Err(MarketError::conflict(format!(
                        "proposal {id} is {} (expected {expected})",
                        p.status
                    ))),
                    _ => Err(MarketError::not_found("proposal", id)),
                }
            }
            Precondition::ContractStatus { id, expected } => {
                match view.load(RecordKey::Contract(*id))? {
                    Some(Record::Contract(c)) if c.status == *expected => Ok(()),
                    Some(Record::Contract(c)) => Err(MarketError::conflict(format!(
                        "contract {id} is {} (expected {expected})",
                        c.status
                    ))),
                    _ => Err(MarketError::not_found("contract", id)),
                }
            }
            Precondition::PaymentStatus { id, expected } => {
                match view.load(RecordKey::Payment(*id))? {
                    Some(Record::Payment(p)) if p.status == *expected => Ok(()),
                    Some(Record::Payment(p)) => Err(MarketError::conflict(format!(
                        "payment {id} is {} (expected {expected})",
                        p.status
                    ))),
                    _ => Err(MarketError::not_found("payment", id)),
                }
            }
            Precondition::PaymentReservation { id, expected } => {
                match view.load(RecordKey::Payment(*id))? {
                    Some(Record::Payment(p))
                        if p.reservation.map(|r| r.token) == *expected =>
                    {
                        Ok(())
                    }
                    Some(Record::Payment(_)) => Err(MarketError::conflict(format!(
                        "payment {id} was claimed by another request"
                    ))),
                    _ => Err(MarketError::not_found("payment", id)),
                }
            }
            Precondition::Absent(key) => match view.load(*key)? {
                None => Ok(()),
                Some(_) => Err(MarketError::conflict_with(
                    format!("{key} already exists"),
                    key.id(),
                )),
            },
            Precondition::NoLiveProposal {
                project_id,
                expert_id,
            } => {
                let live = view
                    .proposals_on(*project_id)?
                    .into_iter()
                    .find(|p| p.expert_id == *expert_id && p.is_live());
                match live {
                    None => Ok(()),
                    Some(p) => Err(MarketError::conflict_with(
                        "expert already has a live proposal on this project",
                        p.id,
                    )),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub owner_id: Option<UserId>,
    pub status: Option<ProjectStatus>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        self.owner_id.is_none_or(|id| project.owner_id == id)
            && self.status.is_none_or(|s| project.status == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
    pub project_id: Option<ProjectId>,
    pub expert_id: Option<UserId>,
    pub status: Option<ProposalStatus>,
}

impl ProposalFilter {
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.project_id.is_none_or(|id| proposal.project_id == id)
            && self.expert_id.is_none_or(|id| proposal.expert_id == id)
            && self.status.is_none_or(|s| proposal.status == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub client_id: Option<UserId>,
    pub expert_id: Option<UserId>,
    pub project_id: Option<ProjectId>,
    pub hold_ref: Option<HoldRef>,
    pub status: Option<PaymentStatus>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.client_id.is_none_or(|id| payment.client_id == id)
            && self.expert_id.is_none_or(|id| payment.expert_id == id)
            && self.project_id.is_none_or(|id| payment.project_id == id)
            && self
                .hold_ref
                .as_ref()
                .is_none_or(|hold| &payment.hold_ref == hold)
            && self.status.is_none_or(|s| payment.status == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    /// Matches invoices where the user is either buyer or seller.
    pub party_id: Option<UserId>,
    pub payment_id: Option<PaymentId>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.party_id
            .is_none_or(|id| invoice.buyer_id == id || invoice.seller_id == id)
            && self.payment_id.is_none_or(|id| invoice.payment_id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub recipient_id: Option<UserId>,
    pub unread_only: bool,
    pub limit: Option<usize>,
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        self.recipient_id
            .is_none_or(|id| notification.recipient_id == id)
            && (!self.unread_only || !notification.read)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractFilter {
    /// Matches contracts where the user is either client or expert.
    pub party_id: Option<UserId>,
    pub project_id: Option<ProjectId>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        self.party_id
            .is_none_or(|id| contract.client_id == id || contract.expert_id == id)
            && self.project_id.is_none_or(|id| contract.project_id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub participant_id: Option<UserId>,
    pub project_id: Option<ProjectId>,
}

impl ConversationFilter {
    pub fn matches(&self, conversation: &Conversation) -> bool {
        self.participant_id
            .is_none_or(|id| conversation.has_participant(id))
            && self.project_id.is_none_or(|id| conversation.project_id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub conversation_id: Option<ConversationId>,
    pub sender_id: Option<UserId>,
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        self.conversation_id
            .is_none_or(|id| message.conversation_id == id)
            && self.sender_id.is_none_or(|id| message.sender_id == id)
    }
}

/// Listing order used by every adapter: newest first, limited if asked.
pub fn newest_first<T>(
    mut rows: Vec<T>,
    created_at: impl Fn(&T) -> DateTime<Utc>,
    limit: Option<usize>,
) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

/// Message threads read top to bottom.
pub fn oldest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|row| created_at(row));
    rows
}
