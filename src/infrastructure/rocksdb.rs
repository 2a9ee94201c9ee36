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
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One column family per entity table.
pub const TABLES: [&str; 9] = [
    "users",
    "projects",
    "proposals",
    "contracts",
    "payments",
    "invoices",
    "notifications",
    "conversations",
    "messages",
];

/// A persistent store implementation using RocksDB.
///
/// Each entity lives in its own column family, keyed by the raw 16 id bytes
/// and stored as JSON. Commits are serialized by an async mutex: the
/// preconditions are read and the resulting rows written as a single
/// `WriteBatch` while it is held.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbMarketStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDbMarketStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = TABLES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn table(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| MarketError::Storage(format!("column family {name} not found")))
    }

    fn load(&self, key: RecordKey) -> Result<Option<Record>> {
        let cf = self.table(key.table())?;
        match self.db.get_cf(cf, key.id().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T>(&self, table: &str, pick: impl Fn(Record) -> Option<T>) -> Result<Vec<T>> {
        let cf = self.table(table)?;
        let mut found = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let record: Record = serde_json::from_slice(&value)?;
            if let Some(row) = pick(record) {
                found.push(row);
            }
        }
        Ok(found)
    }
}

impl RecordView for RocksDbMarketStore {
    fn load(&self, key: RecordKey) -> Result<Option<Record>> {
        RocksDbMarketStore::load(self, key)
    }

    fn proposals_on(&self, project_id: ProjectId) -> Result<Vec<Proposal>> {
        self.scan("proposals", |row| match row {
            Record::Proposal(p) if p.project_id == project_id => Some(p),
            _ => None,
        })
    }

    fn notifications_for(&self, recipient_id: UserId) -> Result<Vec<Notification>> {
        self.scan("notifications", |row| match row {
            Record::Notification(n) if n.recipient_id == recipient_id => Some(n),
            _ => None,
        })
    }
}

#[async_trait]
impl MarketStore for RocksDbMarketStore {
    async fn get(&self, key: RecordKey) -> Result<Option<Record>> {
        self.load(key)
    }

    async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let found = self.scan("projects", |row| match row {
            Record::Project(p) if filter.matches(&p) => Some(p),
            _ => None,
        })?;
        Ok(newest_first(found, |p| p.created_at, None))
    }

    async fn proposals(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>> {
        let found = self.scan("proposals", |row| match row {
            Record::Proposal(p) if filter.matches(&p) => Some(p),
            _ => None,
        })?;
        Ok(newest_first(found, |p| p.created_at, None))
    }

    async fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>> {
        let found = self.scan("contracts", |row| match row {
            Record::Contract(c) if filter.matches(&c) => Some(c),
            _ => None,
        })?;
        Ok(newest_first(found, |c| c.created_at, None))
    }

    async fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let found = self.scan("payments", |row| match row {
            Record::Payment(p) if filter.matches(&p) => Some(p),
            _ => None,
        })?;
        Ok(newest_first(found, |p| p.created_at, None))
    }

    async fn invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let found = self.scan("invoices", |row| match row {
            Record::Invoice(i) if filter.matches(&i) => Some(i),
            _ => None,
        })?;
        Ok(newest_first(found, |i| i.created_at, None))
    }

    async fn notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        let found = self.scan("notifications", |row| match row {
            Record::Notification(n) if filter.matches(&n) => Some(n),
            _ => None,
        })?;
        Ok(newest_first(found, |n| n.created_at, filter.limit))
    }

    async fn count_notifications(&self, filter: &NotificationFilter) -> Result<usize> {
        let found = self.scan("notifications", |row| match row {
            Record::Notification(n) if filter.matches(&n) => Some(()),
            _ => None,
        })?;
        Ok(found.len())
    }

    async fn conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        let found = self.scan("conversations", |row| match row {
            Record::Conversation(c) if filter.matches(&c) => Some(c),
            _ => None,
        })?;
        Ok(newest_first(found, |c| c.created_at, None))
    }

    async fn messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let found = self.scan("messages", |row| match row {
            Record::Message(m) if filter.matches(&m) => Some(m),
            _ => None,
        })?;
        Ok(oldest_first(found, |m| m.created_at))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt> {
        let _guard = self.commit_lock.lock().await;
        let (writes, receipt) = changes.resolve(self)?;

        let mut batch = WriteBatch::default();
        for record in &writes {
            let key = record.key();
            let cf = self.table(key.table())?;
            batch.put_cf(cf, key.id().as_bytes(), serde_json::to_vec(record)?);
        }
        self.db.write(batch)?;
        Ok(receipt)
    }
}
