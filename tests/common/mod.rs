#![allow(dead_code)]

use async_trait::async_trait;
use automarket::application::engine::MarketEngine;
use automarket::application::payments::AuthorizeRequest;
use automarket::application::workflow::{Acceptance, NewProject, NewProposal};
use automarket::config::MarketConfig;
use automarket::domain::contract::Contract;
use automarket::domain::conversation::{Conversation, Message};
use automarket::domain::invoice::{DocumentRef, Invoice, InvoiceDocument};
use automarket::domain::money::Money;
use automarket::domain::notification::Notification;
use automarket::domain::payment::{Payment, PaymentRef};
use automarket::domain::ports::{
    DocumentRenderer, Mailer, MailerHandle, MarketStore, MarketStoreHandle, RendererHandle,
};
use automarket::domain::project::{Project, ProjectCategory};
use automarket::domain::proposal::Proposal;
use automarket::domain::store::{
    ChangeSet, CommitReceipt, ContractFilter, ConversationFilter, InvoiceFilter, MessageFilter,
    Mutation, NotificationFilter, PaymentFilter, ProjectFilter, ProposalFilter, Record, RecordKey,
};
use automarket::domain::user::{Actor, PayeeAccount, Role, UserProfile};
use automarket::domain::ProjectId;
use automarket::error::{MarketError, Result};
use automarket::infrastructure::in_memory::InMemoryMarketStore;
use automarket::infrastructure::ledger::SimulatedLedger;
use automarket::infrastructure::mailer::TracingMailer;
use automarket::infrastructure::rendering::TextInvoiceRenderer;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct Harness {
    pub engine: MarketEngine,
    pub store: MarketStoreHandle,
    pub ledger: SimulatedLedger,
    pub renderer: TextInvoiceRenderer,
    pub client: Actor,
    pub expert: Actor,
    /// A second expert competing for the same projects.
    pub rival: Actor,
    pub admin: Actor,
}

#[derive(Default)]
pub struct HarnessBuilder {
    config: MarketConfig,
    store: Option<MarketStoreHandle>,
    mailer: Option<MailerHandle>,
    renderer: Option<RendererHandle>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: MarketConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: MarketStoreHandle) -> Self {
        self.store = Some(store);
        self
    }

    pub fn mailer(mut self, mailer: MailerHandle) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn renderer(mut self, renderer: RendererHandle) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub async fn build(self) -> Harness {
        let store: MarketStoreHandle = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryMarketStore::new()),
        };
        let ledger = SimulatedLedger::new();
        let renderer = TextInvoiceRenderer::new();

        let client = Actor::new(Uuid::new_v4(), Role::Client);
        let expert = Actor::new(Uuid::new_v4(), Role::Expert);
        let rival = Actor::new(Uuid::new_v4(), Role::Expert);
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        store
            .commit(
                ChangeSet::new()
                    .put(Record::User(profile(client, None)))
                    .put(Record::User(profile(expert, Some("acct_expert"))))
                    .put(Record::User(profile(rival, Some("acct_rival"))))
                    .put(Record::User(profile(admin, None))),
            )
            .await
            .unwrap();

        let documents: RendererHandle = match self.renderer {
            Some(custom) => custom,
            None => Arc::new(renderer.clone()),
        };
        let mailer: MailerHandle = match self.mailer {
            Some(custom) => custom,
            None => Arc::new(TracingMailer),
        };
        let engine = MarketEngine::new(
            store.clone(),
            Arc::new(ledger.clone()),
            documents,
            mailer,
            self.config,
        );
        Harness {
            engine,
            store,
            ledger,
            renderer,
            client,
            expert,
            rival,
            admin,
        }
    }
}

pub fn profile(actor: Actor, payee: Option<&str>) -> UserProfile {
    UserProfile {
        id: actor.user_id,
        email: format!("{}@example.com", actor.role),
        full_name: format!("Test {}", actor.role),
        role: actor.role,
        payee_account: payee.map(|p| PayeeAccount(p.to_string())),
        created_at: Utc::now(),
    }
}

pub async fn harness() -> Harness {
    HarnessBuilder::default().build().await
}

pub fn money(minor: i64) -> Money {
    Money::from_minor(minor)
}

impl Harness {
    pub async fn open_project(&self) -> Project {
        self.engine
            .workflow()
            .post_project(
                &self.client,
                NewProject {
                    id: None,
                    title: "Invoice reconciliation bot".to_string(),
                    description: "Match bank lines to open invoices".to_string(),
                    category: ProjectCategory::Billing,
                    budget: Some(money(200_000)),
                    deadline: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn propose(
        &self,
        expert: &Actor,
        project_id: ProjectId,
        price: i64,
    ) -> Result<Proposal> {
        self.engine
            .workflow()
            .create_proposal(
                expert,
                NewProposal {
                    id: None,
                    project_id,
                    price: money(price),
                    estimated_days: 10,
                    message: "I can do this".to_string(),
                },
            )
            .await
    }

    /// An in-progress project with an active contract for `self.expert`.
    pub async fn contracted(&self) -> (Project, Acceptance) {
        let project = self.open_project().await;
        let proposal = self.propose(&self.expert, project.id, 50_000).await.unwrap();
        let acceptance = self
            .engine
            .workflow()
            .accept(&self.client, proposal.id)
            .await
            .unwrap();
        (project, acceptance)
    }

    pub async fn authorize(&self, project_id: ProjectId, amount: i64) -> Result<Payment> {
        self.engine
            .payments()
            .authorize(
                &self.client,
                AuthorizeRequest {
                    payment_id: None,
                    project_id,
                    expert_id: self.expert.user_id,
                    amount: money(amount),
                },
            )
            .await
    }

    /// A captured payment on a completed contract, ready to be released.
    pub async fn ready_for_release(&self, amount: i64) -> (Project, Contract, Payment) {
        let (project, acceptance) = self.contracted().await;
        let payment = self.authorize(project.id, amount).await.unwrap();
        let paid = self
            .engine
            .payments()
            .confirm(&self.client, &PaymentRef::Id(payment.id))
            .await
            .unwrap();
        self.engine
            .workflow()
            .complete(&self.client, acceptance.contract.id)
            .await
            .unwrap();
        (project, acceptance.contract, paid)
    }

    pub async fn notifications_for(&self, actor: &Actor) -> Vec<Notification> {
        self.engine.flush().await;
        self.store
            .notifications(&NotificationFilter {
                recipient_id: Some(actor.user_id),
                ..Default::default()
            })
            .await
            .unwrap()
    }
}

/// A mailer whose provider is always down.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn deliver(&self, _recipient: &UserProfile, _notification: &Notification) -> Result<()> {
        Err(MarketError::ExternalFailure {
            operation: "send email".to_string(),
            reason: "smtp unavailable".to_string(),
            outcome_unknown: false,
        })
    }
}

/// A renderer that cannot produce documents.
pub struct FailingRenderer;

#[async_trait]
impl DocumentRenderer for FailingRenderer {
    async fn render(&self, _document: &InvoiceDocument) -> Result<DocumentRef> {
        Err(MarketError::Storage("document bucket unavailable".to_string()))
    }
}

/// Wraps the in-memory store and refuses every commit that writes a notification.
#[derive(Default)]
pub struct NotificationBlackhole {
    inner: InMemoryMarketStore,
}

#[async_trait]
impl MarketStore for NotificationBlackhole {
    async fn get(&self, key: RecordKey) -> Result<Option<Record>> {
        self.inner.get(key).await
    }

    async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        self.inner.projects(filter).await
    }

    async fn proposals(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>> {
        self.inner.proposals(filter).await
    }

    async fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>> {
        self.inner.contracts(filter).await
    }

    async fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        self.inner.payments(filter).await
    }

    async fn invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        self.inner.invoices(filter).await
    }

    async fn notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        self.inner.notifications(filter).await
    }

    async fn count_notifications(&self, filter: &NotificationFilter) -> Result<usize> {
        self.inner.count_notifications(filter).await
    }

    async fn conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        self.inner.conversations(filter).await
    }

    async fn messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        self.inner.messages(filter).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt> {
        let writes_notification = changes
            .mutations
            .iter()
            .any(|m| matches!(m, Mutation::Put(Record::Notification(_))));
        if writes_notification {
            return Err(MarketError::Storage("notifications table is read-only".to_string()));
        }
        self.inner.commit(changes).await
    }
}
