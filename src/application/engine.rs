use super::command::{Command, Request, payment_ref};
use super::export::export_user_data;
use super::guards::authenticate;
use super::invoices::InvoiceGenerator;
use super::messaging::{MessageCenter, NewMessage};
use super::notifications::{NotificationDispatcher, NotificationInbox};
use super::payments::{AuthorizeRequest, PaymentOrchestrator, ReleaseRequest};
use super::workflow::{ContractWorkflow, NewProject, NewProposal};
use crate::config::MarketConfig;
use crate::domain::ports::{LedgerHandle, MailerHandle, MarketStoreHandle, RendererHandle};
use crate::domain::proposal::ProposalStatus;
use crate::error::{MarketError, Result};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

/// The main entry point of the marketplace core.
///
/// `MarketEngine` wires the use cases to the injected ports, authenticates
/// the caller of every [`Request`] and dispatches it. Results come back as
/// JSON values so any front end can serialize them unchanged.
pub struct MarketEngine {
    store: MarketStoreHandle,
    workflow: ContractWorkflow,
    payments: PaymentOrchestrator,
    invoices: InvoiceGenerator,
    messages: MessageCenter,
    inbox: NotificationInbox,
    notifier: NotificationDispatcher,
}

impl MarketEngine {
    /// Creates a new `MarketEngine` and starts its notification worker, so it
    /// must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence for every entity.
    /// * `ledger` - The payment processor.
    /// * `renderer` - Produces invoice documents.
    /// * `mailer` - Delivers notification emails.
    /// * `config` - Validated runtime settings.
    pub fn new(
        store: MarketStoreHandle,
        ledger: LedgerHandle,
        renderer: RendererHandle,
        mailer: MailerHandle,
        config: MarketConfig,
    ) -> Self {
        let notifier = NotificationDispatcher::spawn(store.clone(), mailer);
        let invoices = InvoiceGenerator::new(store.clone(), renderer, &config);
        let workflow = ContractWorkflow::new(store.clone(), notifier.clone());
        let payments = PaymentOrchestrator::new(
            store.clone(),
            ledger,
            invoices.clone(),
            notifier.clone(),
            config,
        );
        let messages = MessageCenter::new(store.clone(), notifier.clone());
        let inbox = NotificationInbox::new(store.clone());
        Self {
            store,
            workflow,
            payments,
            invoices,
            messages,
            inbox,
            notifier,
        }
    }

    pub fn store(&self) -> &MarketStoreHandle {
        &self.store
    }

    pub fn workflow(&self) -> &ContractWorkflow {
        &self.workflow
    }

    pub fn payments(&self) -> &PaymentOrchestrator {
        &self.payments
    }

    pub fn invoices(&self) -> &InvoiceGenerator {
        &self.invoices
    }

    pub fn messages(&self) -> &MessageCenter {
        &self.messages
    }

    pub fn inbox(&self) -> &NotificationInbox {
        &self.inbox
    }

    /// Waits for queued notifications to be stored and mailed.
    pub async fn flush(&self) {
        self.notifier.flush().await;
    }

    /// Authenticates the caller and runs one command.
    pub async fn execute(&self, request: Request) -> Result<Value> {
        let actor = authenticate(self.store.as_ref(), request.actor).await?;
        debug!(
            op = request.command.name(),
            actor = %actor.user_id,
            role = %actor.role,
            "executing command"
        );

        match request.command {
            Command::PostProject {
                id,
                title,
                description,
                category,
                budget,
                deadline,
            } => to_value(
                self.workflow
                    .post_project(
                        &actor,
                        NewProject {
                            id,
                            title,
                            description,
                            category,
                            budget,
                            deadline,
                        },
                    )
                    .await?,
            ),
            Command::CancelProject { project_id } => {
                to_value(self.workflow.cancel_project(&actor, project_id).await?)
            }
            Command::CreateProposal {
                id,
                project_id,
                price,
                estimated_days,
                message,
            } => to_value(
                self.workflow
                    .create_proposal(
                        &actor,
                        NewProposal {
                            id,
                            project_id,
                            price,
                            estimated_days,
                            message,
                        },
                    )
                    .await?,
            ),
            Command::UpdateProposalStatus {
                proposal_id,
                status,
            } => match status {
                ProposalStatus::Accepted => {
                    to_value(self.workflow.accept(&actor, proposal_id).await?)
                }
                ProposalStatus::Rejected => {
                    to_value(self.workflow.reject(&actor, proposal_id).await?)
                }
                ProposalStatus::Sent => Err(MarketError::BadRequest(
                    "status must be accepted or rejected".to_string(),
                )),
            },
            Command::CompleteContract { contract_id } => {
                to_value(self.workflow.complete(&actor, contract_id).await?)
            }
            Command::ForceCompleteContract { contract_id } => {
                to_value(self.workflow.force_complete(&actor, contract_id).await?)
            }
            Command::AuthorizePayment {
                id,
                project_id,
                expert_id,
                amount,
            } => to_value(
                self.payments
                    .authorize(
                        &actor,
                        AuthorizeRequest {
                            payment_id: id,
                            project_id,
                            expert_id,
                            amount,
                        },
                    )
                    .await?,
            ),
            Command::ConfirmPayment {
                payment_id,
                hold_ref,
            } => {
                let reference = payment_ref(payment_id, hold_ref)?;
                to_value(self.payments.confirm(&actor, &reference).await?)
            }
            Command::ReleasePayment {
                payment_id,
                project_id,
                expert_id,
            } => to_value(
                self.payments
                    .release(
                        &actor,
                        ReleaseRequest {
                            payment_id,
                            project_id,
                            expert_id,
                        },
                    )
                    .await?,
            ),
            Command::RefundPayment { payment_id } => {
                to_value(self.payments.refund(&actor, payment_id).await?)
            }
            Command::DisputePayment { payment_id } => {
                to_value(self.payments.dispute(&actor, payment_id).await?)
            }
            Command::GenerateInvoice {
                payment_id,
                hold_ref,
            } => {
                let reference = payment_ref(payment_id, hold_ref)?;
                let invoice = self.invoices.generate_for(&actor, &reference).await?;
                let number = invoice.number();
                let mut value = to_value(invoice)?;
                value["number"] = json!(number);
                Ok(value)
            }
            Command::ListProposals { project_id } => {
                to_value(self.workflow.list_proposals(&actor, project_id).await?)
            }
            Command::PaymentHistory {} => to_value(self.payments.history(&actor).await?),
            Command::ListInvoices {} => to_value(self.invoices.list_for(&actor).await?),
            Command::ListNotifications { unread_only, limit } => {
                to_value(self.inbox.list(&actor, unread_only, limit).await?)
            }
            Command::MarkNotificationRead { notification_id } => {
                to_value(self.inbox.mark_read(&actor, notification_id).await?)
            }
            Command::MarkAllNotificationsRead {} => {
                let marked = self.inbox.mark_all_read(&actor).await?;
                Ok(json!({ "marked_read": marked }))
            }
            Command::OpenConversation { project_id } => {
                to_value(self.messages.open(&actor, project_id).await?)
            }
            Command::SendMessage {
                id,
                conversation_id,
                text,
            } => to_value(
                self.messages
                    .send(
                        &actor,
                        NewMessage {
                            id,
                            conversation_id,
                            text,
                        },
                    )
                    .await?,
            ),
            Command::ListMessages { conversation_id } => {
                to_value(self.messages.thread(&actor, conversation_id).await?)
            }
            Command::ListConversations {} => to_value(self.messages.list(&actor).await?),
            Command::ExportUserData {} => {
                to_value(export_user_data(self.store.as_ref(), &actor).await?)
            }
        }
    }
}

fn to_value(value: impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MarketStore;
    use crate::domain::store::{ChangeSet, Record};
    use crate::domain::user::{PayeeAccount, Role, UserProfile};
    use crate::infrastructure::in_memory::InMemoryMarketStore;
    use crate::infrastructure::ledger::SimulatedLedger;
    use crate::infrastructure::mailer::TracingMailer;
    use crate::infrastructure::rendering::TextInvoiceRenderer;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Fixture {
        engine: MarketEngine,
        client: Uuid,
        expert: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryMarketStore::new());
        let client = Uuid::new_v4();
        let expert = Uuid::new_v4();
        let profile = |id, role, payee: Option<&str>| UserProfile {
            id,
            email: format!("{id}@example.com"),
            full_name: "Test User".to_string(),
            role,
            payee_account: payee.map(|p| PayeeAccount(p.to_string())),
            created_at: Utc::now(),
        };
        store
            .commit(
                ChangeSet::new()
                    .put(Record::User(profile(client, Role::Client, None)))
                    .put(Record::User(profile(expert, Role::Expert, Some("acct_expert")))),
            )
            .await
            .unwrap();

        let engine = MarketEngine::new(
            store,
            Arc::new(SimulatedLedger::new()),
            Arc::new(TextInvoiceRenderer::new()),
            Arc::new(TracingMailer),
            MarketConfig::default(),
        );
        Fixture {
            engine,
            client,
            expert,
        }
    }

    async fn run(engine: &MarketEngine, line: Value) -> Result<Value> {
        let request: Request = serde_json::from_value(line).unwrap();
        engine.execute(request).await
    }

    #[tokio::test]
    async fn test_requests_without_a_known_actor_are_rejected() {
        let f = fixture().await;

        let anonymous = run(&f.engine, json!({"op": "payment_history"})).await;
        assert!(matches!(anonymous, Err(MarketError::Unauthenticated)));

        let stranger = run(
            &f.engine,
            json!({"op": "payment_history", "actor": Uuid::new_v4()}),
        )
        .await;
        assert!(matches!(stranger, Err(MarketError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_escrow_flow_through_commands() {
        let f = fixture().await;

        let project = run(
            &f.engine,
            json!({
                "op": "post_project",
                "actor": f.client,
                "title": "Lead scoring",
                "category": "sales"
            }),
        )
        .await
        .unwrap();
        let project_id = project["id"].clone();
        assert_eq!(project["status"], "open");

        let proposal = run(
            &f.engine,
            json!({
                "op": "create_proposal",
                "actor": f.expert,
                "project_id": project_id,
                "price": "500.00",
                "estimated_days": 10
            }),
        )
        .await
        .unwrap();

        let accepted = run(
            &f.engine,
            json!({
                "op": "update_proposal_status",
                "actor": f.client,
                "proposal_id": proposal["id"],
                "status": "accepted"
            }),
        )
        .await
        .unwrap();
        assert_eq!(accepted["contract"]["agreed_price"], "500.00");
        assert_eq!(accepted["project"]["status"], "in_progress");

        let payment = run(
            &f.engine,
            json!({
                "op": "authorize_payment",
                "actor": f.client,
                "project_id": project_id,
                "expert_id": f.expert,
                "amount": "1000.00"
            }),
        )
        .await
        .unwrap();
        assert_eq!(payment["status"], "pending");
        assert_eq!(payment["commission"], "50.00");
        assert_eq!(payment["expert_amount"], "950.00");

        let paid = run(
            &f.engine,
            json!({"op": "confirm_payment", "actor": f.client, "hold_ref": payment["hold_ref"]}),
        )
        .await
        .unwrap();
        assert_eq!(paid["status"], "paid");

        run(
            &f.engine,
            json!({
                "op": "complete_contract",
                "actor": f.client,
                "contract_id": accepted["contract"]["id"]
            }),
        )
        .await
        .unwrap();

        let released = run(
            &f.engine,
            json!({
                "op": "release_payment",
                "actor": f.client,
                "payment_id": payment["id"],
                "project_id": project_id,
                "expert_id": f.expert
            }),
        )
        .await
        .unwrap();
        assert_eq!(released["status"], "released");
        assert!(released["transfer_ref"].as_str().unwrap().starts_with("tr_"));

        // Confirm already produced the invoice.
        let invoices = run(&f.engine, json!({"op": "list_invoices", "actor": f.expert}))
            .await
            .unwrap();
        assert_eq!(invoices.as_array().unwrap().len(), 1);
        let again = run(
            &f.engine,
            json!({"op": "generate_invoice", "actor": f.client, "payment_id": payment["id"]}),
        )
        .await;
        assert!(matches!(again, Err(MarketError::Conflict { .. })));

        let history = run(&f.engine, json!({"op": "payment_history", "actor": f.expert}))
            .await
            .unwrap();
        assert_eq!(history["stats"]["released_amount"], "950.00");
    }

    #[tokio::test]
    async fn test_proposal_cannot_be_set_back_to_sent() {
        let f = fixture().await;
        let result = run(
            &f.engine,
            json!({
                "op": "update_proposal_status",
                "actor": f.client,
                "proposal_id": Uuid::new_v4(),
                "status": "sent"
            }),
        )
        .await;
        assert!(matches!(result, Err(MarketError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_confirm_needs_a_payment_reference() {
        let f = fixture().await;
        let result = run(&f.engine, json!({"op": "confirm_payment", "actor": f.client})).await;
        assert!(matches!(result, Err(MarketError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_notification_commands() {
        let f = fixture().await;
        let project = run(
            &f.engine,
            json!({
                "op": "post_project",
                "actor": f.client,
                "title": "HR onboarding",
                "category": "human_resources"
            }),
        )
        .await
        .unwrap();
        run(
            &f.engine,
            json!({
                "op": "create_proposal",
                "actor": f.expert,
                "project_id": project["id"],
                "price": "80.00",
                "estimated_days": 3
            }),
        )
        .await
        .unwrap();
        f.engine.flush().await;

        let inbox = run(&f.engine, json!({"op": "list_notifications", "actor": f.client}))
            .await
            .unwrap();
        assert_eq!(inbox["unread_count"], 1);
        assert_eq!(inbox["notifications"][0]["type"], "NEW_PROPOSAL");

        let marked = run(
            &f.engine,
            json!({"op": "mark_all_notifications_read", "actor": f.client}),
        )
        .await
        .unwrap();
        assert_eq!(marked, json!({"marked_read": 1}));

        let unread = run(
            &f.engine,
            json!({"op": "list_notifications", "actor": f.client, "unread_only": true}),
        )
        .await
        .unwrap();
        assert_eq!(unread["notifications"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_conversation_commands_and_export() {
        let f = fixture().await;
        let project = run(
            &f.engine,
            json!({
                "op": "post_project",
                "actor": f.client,
                "title": "Stock forecasting",
                "category": "operations"
            }),
        )
        .await
        .unwrap();

        let conversation = run(
            &f.engine,
            json!({"op": "open_conversation", "actor": f.expert, "project_id": project["id"]}),
        )
        .await
        .unwrap();
        assert_eq!(conversation["client_id"], json!(f.client));
        let sent = run(
            &f.engine,
            json!({
                "op": "send_message",
                "actor": f.expert,
                "conversation_id": conversation["id"],
                "text": "  Which ERP do you use?  "
            }),
        )
        .await
        .unwrap();
        assert_eq!(sent["text"], "Which ERP do you use?");

        let thread = run(
            &f.engine,
            json!({
                "op": "list_messages",
                "actor": f.client,
                "conversation_id": conversation["id"]
            }),
        )
        .await
        .unwrap();
        assert_eq!(thread["messages"].as_array().unwrap().len(), 1);
        let listed = run(&f.engine, json!({"op": "list_conversations", "actor": f.client}))
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        f.engine.flush().await;

        let export = run(&f.engine, json!({"op": "export_user_data", "actor": f.expert}))
            .await
            .unwrap();
        assert_eq!(export["user_id"], json!(f.expert));
        assert_eq!(export["totals"]["conversations"], 1);
        assert_eq!(export["totals"]["messages"], 1);
        assert_eq!(export["totals"]["projects"], 0);
        let client_export = run(&f.engine, json!({"op": "export_user_data", "actor": f.client}))
            .await
            .unwrap();
        assert_eq!(client_export["totals"]["projects"], 1);
        assert_eq!(client_export["totals"]["messages"], 0);
        assert_eq!(client_export["totals"]["notifications"], 1);
        assert_eq!(client_export["notifications"][0]["type"], "NEW_MESSAGE");
    }
}
