use super::contract::Contract;
use super::conversation::{Conversation, Message};
use super::invoice::{DocumentRef, Invoice, InvoiceDocument};
use super::ledger::{
    GatewayError, HoldRef, HoldRequest, IdempotencyKey, TransferRef, TransferRequest,
};
use super::money::Money;
use super::notification::Notification;
use super::payment::Payment;
use super::project::Project;
use super::proposal::Proposal;
use super::store::{
    ChangeSet, CommitReceipt, ContractFilter, ConversationFilter, InvoiceFilter, MessageFilter,
    NotificationFilter, PaymentFilter, ProjectFilter, ProposalFilter, Record, RecordKey,
};
use super::user::UserProfile;
use super::{
    ContractId, ConversationId, InvoiceId, NotificationId, PaymentId, ProjectId, ProposalId,
    UserId,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence port for every marketplace entity.
///
/// Reads are plain lookups. Every write goes through [`MarketStore::commit`],
/// which evaluates the change set's preconditions and applies its mutations
/// atomically: either all rows land or none do.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn get(&self, key: RecordKey) -> Result<Option<Record>>;
    async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;
    async fn proposals(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>>;
    async fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>>;
    async fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>>;
    async fn invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>>;
    async fn notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>>;
    /// Count-only variant of [`MarketStore::notifications`]; ignores `limit`.
    async fn count_notifications(&self, filter: &NotificationFilter) -> Result<usize>;
    async fn conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>>;
    /// Oldest first.
    async fn messages(&self, filter: &MessageFilter) -> Result<Vec<Message>>;
    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt>;

    async fn user(&self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(match self.get(RecordKey::User(id)).await? {
            Some(Record::User(user)) => Some(user),
            _ => None,
        })
    }

    async fn project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(match self.get(RecordKey::Project(id)).await? {
            Some(Record::Project(project)) => Some(project),
            _ => None,
        })
    }

    async fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>> {
        Ok(match self.get(RecordKey::Proposal(id)).await? {
            Some(Record::Proposal(proposal)) => Some(proposal),
            _ => None,
        })
    }

    async fn contract(&self, id: ContractId) -> Result<Option<Contract>> {
        Ok(match self.get(RecordKey::Contract(id)).await? {
            Some(Record::Contract(contract)) => Some(contract),
            _ => None,
        })
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(match self.get(RecordKey::Payment(id)).await? {
            Some(Record::Payment(payment)) => Some(payment),
            _ => None,
        })
    }

    async fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(match self.get(RecordKey::Invoice(id)).await? {
            Some(Record::Invoice(invoice)) => Some(invoice),
            _ => None,
        })
    }

    async fn notification(&self, id: NotificationId) -> Result<Option<Notification>> {
        Ok(match self.get(RecordKey::Notification(id)).await? {
            Some(Record::Notification(notification)) => Some(notification),
            _ => None,
        })
    }

    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        Ok(match self.get(RecordKey::Conversation(id)).await? {
            Some(Record::Conversation(conversation)) => Some(conversation),
            _ => None,
        })
    }
}

pub type MarketStoreHandle = Arc<dyn MarketStore>;

/// The external payment processor.
///
/// Every mutating call carries an idempotency key; replaying a key must
/// return the first result without a second effect.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn authorize(&self, request: HoldRequest) -> std::result::Result<HoldRef, GatewayError>;
    async fn capture(
        &self,
        hold: &HoldRef,
        key: &IdempotencyKey,
    ) -> std::result::Result<(), GatewayError>;
    async fn transfer(
        &self,
        request: TransferRequest,
    ) -> std::result::Result<TransferRef, GatewayError>;
    /// Refunds a captured charge or voids a hold. `None` means the full amount.
    async fn refund(
        &self,
        hold: &HoldRef,
        amount: Option<Money>,
        key: &IdempotencyKey,
    ) -> std::result::Result<(), GatewayError>;
}

pub type LedgerHandle = Arc<dyn LedgerGateway>;

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, document: &InvoiceDocument) -> Result<DocumentRef>;
}

pub type RendererHandle = Arc<dyn DocumentRenderer>;

/// Transactional email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, recipient: &UserProfile, notification: &Notification) -> Result<()>;
}

pub type MailerHandle = Arc<dyn Mailer>;
