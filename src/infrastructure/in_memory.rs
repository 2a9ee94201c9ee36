use crate::domain::contract::Contract;
use crate::domain::conversation::{Conversation, Message};
use crate::domain::invoice::Invoice;
use crate::domain::notification::Notification;
use crate::domain::payment::Payment;
use crate::domain::ports::MarketStore;
use crate::domain::project::Project;
use crate::domain::proposal::Proposal;
use crate::domain::store::{
    ChangeSet, CommitReceipt, ContractFilter, ConversationFilter, InvoiceFilter, MessageFilter,
    NotificationFilter, PaymentFilter, ProjectFilter, ProposalFilter, Record, RecordKey,
    RecordView, newest_first, oldest_first,
};
use crate::domain::{ProjectId, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Tables = HashMap<RecordKey, Record>;

/// A thread-safe in-memory store for every marketplace entity.
///
/// All rows live in one `Arc<RwLock<HashMap<RecordKey, Record>>>`. A commit
/// takes the write lock, checks its preconditions and applies every row
/// before releasing it, so concurrent commits are serialized.
/// Ideal for tests and single-run CLI sessions.
#[derive(Default, Clone)]
pub struct InMemoryMarketStore {
    rows: Arc<RwLock<Tables>>,
}

impl InMemoryMarketStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn scan<T>(&self, pick: impl Fn(&Record) -> Option<T>) -> Vec<T> {
        let rows = self.rows.read().await;
        rows.values().filter_map(pick).collect()
    }
}

struct TablesView<'a>(&'a Tables);

impl RecordView for TablesView<'_> {
    fn load(&self, key: RecordKey) -> Result<Option<Record>> {
        Ok(self.0.get(&key).cloned())
    }

    fn proposals_on(&self, project_id: ProjectId) -> Result<Vec<Proposal>> {
        Ok(self
            .0
            .values()
            .filter_map(|row| match row {
                Record::Proposal(p) if p.project_id == project_id => Some(p.clone()),
                _ => None,
            })
            .collect())
    }

    fn notifications_for(&self, recipient_id: UserId) -> Result<Vec<Notification>> {
        Ok(self
            .0
            .values()
            .filter_map(|row| match row {
                Record::Notification(n) if n.recipient_id == recipient_id => Some(n.clone()),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn get(&self, key: RecordKey) -> Result<Option<Record>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&key).cloned())
    }

    async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let found = self
            .scan(|row| match row {
                Record::Project(p) if filter.matches(p) => Some(p.clone()),
                _ => None,
            })
            .await;
        Ok(newest_first(found, |p| p.created_at, None))
    }

    async fn proposals(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>> {
        let found = self
            .scan(|row| match row {
                Record::Proposal(p) if filter.matches(p) => Some(p.clone()),
                _ => None,
            })
            .await;
        Ok(newest_first(found, |p| p.created_at, None))
    }

    async fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>> {
        let found = self
            .scan(|row| match row {
                Record::Contract(c) if filter.matches(c) => Some(c.clone()),
                _ => None,
            })
            .await;
        Ok(newest_first(found, |c| c.created_at, None))
    }

    async fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let found = self
            .scan(|row| match row {
                Record::Payment(p) if filter.matches(p) => Some(p.clone()),
                _ => None,
            })
            .await;
        Ok(newest_first(found, |p| p.created_at, None))
    }

    async fn invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let found = self
            .scan(|row| match row {
                Record::Invoice(i) if filter.matches(i) => Some(i.clone()),
                _ => None,
            })
            .await;
        Ok(newest_first(found, |i| i.created_at, None))
    }

    async fn notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        let found = self
            .scan(|row| match row {
                Record::Notification(n) if filter.matches(n) => Some(n.clone()),
                _ => None,
            })
            .await;
        Ok(newest_first(found, |n| n.created_at, filter.limit))
    }

    async fn count_notifications(&self, filter: &NotificationFilter) -> Result<usize> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| matches!(row, Record::Notification(n) if filter.matches(n)))
            .count())
    }

    async fn conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        let found = self
            .scan(|row| match row {
                Record::Conversation(c) if filter.matches(c) => Some(c.clone()),
                _ => None,
            })
            .await;
        Ok(newest_first(found, |c| c.created_at, None))
    }

    async fn messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let found = self
            .scan(|row| match row {
                Record::Message(m) if filter.matches(m) => Some(m.clone()),
                _ => None,
            })
            .await;
        Ok(oldest_first(found, |m| m.created_at))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt> {
        let mut rows = self.rows.write().await;
        let (writes, receipt) = changes.resolve(&TablesView(&rows))?;
        for record in writes {
            rows.insert(record.key(), record);
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::project::{ProjectCategory, ProjectStatus};
    use crate::domain::proposal::ProposalStatus;
    use crate::domain::store::Precondition;
    use crate::error::MarketError;
    use chrono::Utc;
    use uuid::Uuid;

    fn project(owner: Uuid) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            title: "Lead scoring".to_string(),
            description: "Score inbound leads".to_string(),
            category: ProjectCategory::Sales,
            budget: Some(Money::from_minor(200_000)),
            deadline: None,
            status: ProjectStatus::Open,
            owner_id: owner,
            created_at: now,
            updated_at: now,
        }
    }

    fn proposal(project_id: Uuid, expert_id: Uuid) -> Proposal {
        let now = Utc::now();
        Proposal {
            id: Uuid::new_v4(),
            project_id,
            expert_id,
            price: Money::from_minor(150_000),
            estimated_days: 7,
            message: "Ready to start".to_string(),
            status: ProposalStatus::Sent,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let store = InMemoryMarketStore::new();
        let project = project(Uuid::new_v4());
        store
            .commit(ChangeSet::new().put(Record::Project(project.clone())))
            .await
            .unwrap();

        assert_eq!(store.project(project.id).await.unwrap(), Some(project.clone()));
        assert!(store.project(Uuid::new_v4()).await.unwrap().is_none());
        // A key of another table never aliases.
        assert!(store.proposal(project.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_precondition_writes_nothing() {
        let store = InMemoryMarketStore::new();
        let mut project = project(Uuid::new_v4());
        project.status = ProjectStatus::Cancelled;
        store
            .commit(ChangeSet::new().put(Record::Project(project.clone())))
            .await
            .unwrap();

        let bid = proposal(project.id, Uuid::new_v4());
        let result = store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::ProjectStatus {
                        id: project.id,
                        expected: ProjectStatus::Open,
                    })
                    .put(Record::Proposal(bid.clone())),
            )
            .await;

        assert!(matches!(result, Err(MarketError::Conflict { .. })));
        assert!(store.proposal(bid.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_reject_spares_the_winner() {
        let store = InMemoryMarketStore::new();
        let project = project(Uuid::new_v4());
        let winner = proposal(project.id, Uuid::new_v4());
        let loser = proposal(project.id, Uuid::new_v4());
        let elsewhere = proposal(Uuid::new_v4(), Uuid::new_v4());
        store
            .commit(
                ChangeSet::new()
                    .put(Record::Project(project.clone()))
                    .put(Record::Proposal(winner.clone()))
                    .put(Record::Proposal(loser.clone()))
                    .put(Record::Proposal(elsewhere.clone())),
            )
            .await
            .unwrap();

        let receipt = store
            .commit(ChangeSet::new().reject_sent_proposals(
                project.id,
                Some(winner.id),
                Utc::now(),
            ))
            .await
            .unwrap();

        assert_eq!(receipt.rejected_proposals, vec![loser.id]);
        let status = |id| {
            let store = store.clone();
            async move { store.proposal(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(winner.id).await, ProposalStatus::Sent);
        assert_eq!(status(loser.id).await, ProposalStatus::Rejected);
        assert_eq!(status(elsewhere.id).await, ProposalStatus::Sent);
    }

    #[tokio::test]
    async fn test_filters() {
        let store = InMemoryMarketStore::new();
        let owner = Uuid::new_v4();
        let expert = Uuid::new_v4();
        let mine = project(owner);
        let other = project(Uuid::new_v4());
        store
            .commit(
                ChangeSet::new()
                    .put(Record::Project(mine.clone()))
                    .put(Record::Project(other.clone()))
                    .put(Record::Proposal(proposal(mine.id, expert)))
                    .put(Record::Proposal(proposal(other.id, expert))),
            )
            .await
            .unwrap();

        let owned = store
            .projects(&ProjectFilter {
                owner_id: Some(owner),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(owned, vec![mine.clone()]);

        let on_mine = store
            .proposals(&ProposalFilter {
                project_id: Some(mine.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(on_mine.len(), 1);

        let by_expert = store
            .proposals(&ProposalFilter {
                expert_id: Some(expert),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_expert.len(), 2);
    }
}
