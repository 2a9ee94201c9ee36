use super::guards::{require_admin, require_ownership, require_role};
use super::invoices::InvoiceGenerator;
use super::notifications::NotificationDispatcher;
use crate::config::MarketConfig;
use crate::domain::ledger::{
    GatewayError, HoldRequest, IdempotencyKey, LedgerMetadata, LedgerOperation, TransferRequest,
};
use crate::domain::money::Money;
use crate::domain::notification::Notice;
use crate::domain::payment::{NewPayment, Payment, PaymentRef, PaymentStats, PaymentStatus};
use crate::domain::ports::{LedgerHandle, MarketStore, MarketStoreHandle};
use crate::domain::project::ProjectStatus;
use crate::domain::store::{ChangeSet, PaymentFilter, Precondition, Record, RecordKey};
use crate::domain::user::{Actor, Role};
use crate::domain::{PaymentId, ProjectId, UserId};
use crate::error::{MarketError, Result};
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub payment_id: Option<PaymentId>,
    pub project_id: ProjectId,
    pub expert_id: UserId,
    pub amount: Money,
}

#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub payment_id: PaymentId,
    pub project_id: ProjectId,
    pub expert_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistory {
    pub payments: Vec<Payment>,
    pub stats: PaymentStats,
}

/// Looks a payment up by id or by the processor's hold reference.
pub async fn find_payment(store: &dyn MarketStore, reference: &PaymentRef) -> Result<Payment> {
    let found = match reference {
        PaymentRef::Id(id) => store.payment(*id).await?,
        PaymentRef::Hold(hold) => store
            .payments(&PaymentFilter {
                hold_ref: Some(hold.clone()),
                ..Default::default()
            })
            .await?
            .into_iter()
            .next(),
    };
    found.ok_or_else(|| MarketError::not_found("payment", reference))
}

/// Maps a processor error onto the core taxonomy. Permanent refusals are the
/// caller's problem (`BadRequest`); everything else may succeed on retry.
fn gateway_failure(operation: LedgerOperation, error: GatewayError) -> MarketError {
    match error {
        GatewayError::Permanent(reason) => MarketError::BadRequest(format!(
            "{operation} refused by the payment processor: {reason}"
        )),
        other => MarketError::ExternalFailure {
            operation: operation.to_string(),
            outcome_unknown: other.outcome_unknown(),
            reason: other.to_string(),
        },
    }
}

/// The escrow lifecycle: hold, capture, payout.
///
/// No store lock is ever held across a processor call. Each ledger call is
/// bracketed by two guarded commits: one that reserves the payment for the
/// operation and one that records the outcome and clears the reservation.
/// A second caller arriving in between sees the reservation and gets
/// `Conflict` instead of issuing a duplicate call.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: MarketStoreHandle,
    ledger: LedgerHandle,
    invoices: InvoiceGenerator,
    notifier: NotificationDispatcher,
    config: MarketConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        store: MarketStoreHandle,
        ledger: LedgerHandle,
        invoices: InvoiceGenerator,
        notifier: NotificationDispatcher,
        config: MarketConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            invoices,
            notifier,
            config,
        }
    }

    /// Runs one processor call under the configured deadline.
    async fn call<T>(
        &self,
        operation: LedgerOperation,
        request: impl Future<Output = std::result::Result<T, GatewayError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.gateway_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(gateway_failure(operation, error)),
            Err(_) => Err(gateway_failure(operation, GatewayError::Timeout)),
        }
    }

    async fn load(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .payment(id)
            .await?
            .ok_or_else(|| MarketError::not_found("payment", id))
    }

    /// Claims `payment` for `operation`. The commit only succeeds if nobody
    /// changed the status or took the reservation since we read it.
    async fn reserve(&self, payment: &Payment, operation: LedgerOperation) -> Result<Payment> {
        let mut reserved = payment.clone();
        reserved.reserve(operation, Utc::now(), self.config.lease())?;
        self.store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::PaymentStatus {
                        id: payment.id,
                        expected: payment.status,
                    })
                    .expect(Precondition::PaymentReservation {
                        id: payment.id,
                        expected: payment.reservation.map(|r| r.token),
                    })
                    .put(Record::Payment(reserved.clone())),
            )
            .await?;
        Ok(reserved)
    }

    /// Drops our reservation after a failed call; the payment keeps its status.
    async fn abandon(&self, reserved: &Payment) {
        let mut cleared = reserved.clone();
        cleared.clear_reservation(Utc::now());
        let result = self
            .store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::PaymentReservation {
                        id: reserved.id,
                        expected: reserved.reservation.map(|r| r.token),
                    })
                    .put(Record::Payment(cleared)),
            )
            .await;
        if let Err(err) = result {
            warn!(payment_id = %reserved.id, error = %err, "failed to clear payment reservation");
        }
    }

    /// Guards for the commit that records the outcome of a reserved call.
    fn settle(reserved: &Payment) -> ChangeSet {
        ChangeSet::new()
            .expect(Precondition::PaymentStatus {
                id: reserved.id,
                expected: reserved.status,
            })
            .expect(Precondition::PaymentReservation {
                id: reserved.id,
                expected: reserved.reservation.map(|r| r.token),
            })
    }

    pub async fn authorize(&self, actor: &Actor, request: AuthorizeRequest) -> Result<Payment> {
        require_role(actor, Role::Client)?;
        if !request.amount.is_positive() {
            return Err(MarketError::BadRequest(format!(
                "amount {} must be positive",
                request.amount
            )));
        }
        if !request.amount.within_limit() {
            return Err(MarketError::BadRequest(format!(
                "amount {} exceeds the {} limit per payment",
                request.amount,
                Money::MAX
            )));
        }
        let project = self
            .store
            .project(request.project_id)
            .await?
            .ok_or_else(|| MarketError::not_found("project", request.project_id))?;
        require_ownership(actor, project.owner_id, "project")?;
        let expert = self
            .store
            .user(request.expert_id)
            .await?
            .ok_or_else(|| MarketError::not_found("user", request.expert_id))?;
        if expert.role != Role::Expert {
            return Err(MarketError::Forbidden(format!(
                "user {} is not an expert",
                expert.id
            )));
        }

        let payment_id = request.payment_id.unwrap_or_else(Uuid::new_v4);
        if self.store.payment(payment_id).await?.is_some() {
            return Err(MarketError::conflict_with(
                "payment already exists",
                payment_id,
            ));
        }
        let split = self.config.commission_rate.split(request.amount)?;

        let metadata = LedgerMetadata::from([
            ("payment_id".to_string(), payment_id.to_string()),
            ("project_id".to_string(), project.id.to_string()),
            ("client_id".to_string(), actor.user_id.to_string()),
            ("expert_id".to_string(), expert.id.to_string()),
            ("commission".to_string(), split.commission.to_string()),
            ("expert_amount".to_string(), split.expert_amount.to_string()),
        ]);
        let hold_ref = self
            .call(
                LedgerOperation::Authorize,
                self.ledger.authorize(HoldRequest {
                    amount: request.amount,
                    currency: self.config.currency.clone(),
                    metadata,
                    idempotency_key: IdempotencyKey::for_payment(
                        payment_id,
                        LedgerOperation::Authorize,
                    ),
                }),
            )
            .await?;

        let payment = Payment::new(
            NewPayment {
                id: payment_id,
                project_id: project.id,
                client_id: actor.user_id,
                expert_id: expert.id,
                amount: request.amount,
                split,
                currency: self.config.currency.clone(),
                hold_ref,
            },
            Utc::now(),
        )?;
        let persisted = self
            .store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::Absent(RecordKey::Payment(payment.id)))
                    .put(Record::Payment(payment.clone())),
            )
            .await;
        if let Err(err) = persisted {
            // Same id, same idempotency key: a stored row owns this hold.
            if let Ok(Some(_)) = self.store.payment(payment.id).await {
                warn!(payment_id = %payment.id, "payment was recorded by a concurrent request");
                return Err(MarketError::conflict_with("payment already exists", payment.id));
            }
            self.void_hold(&payment).await;
            return Err(err);
        }

        info!(
            payment_id = %payment.id,
            hold_ref = %payment.hold_ref,
            amount = %payment.amount(),
            commission = %payment.commission(),
            "payment authorized"
        );
        Ok(payment)
    }

    /// Best-effort release of a hold whose payment row could not be written.
    async fn void_hold(&self, payment: &Payment) {
        let key = IdempotencyKey::for_payment(payment.id, LedgerOperation::Refund);
        let voided = self
            .call(
                LedgerOperation::Refund,
                self.ledger.refund(&payment.hold_ref, None, &key),
            )
            .await;
        match voided {
            Ok(()) => warn!(
                payment_id = %payment.id,
                hold_ref = %payment.hold_ref,
                "voided hold of unrecorded payment"
            ),
            Err(err) => warn!(
                payment_id = %payment.id,
                hold_ref = %payment.hold_ref,
                error = %err,
                "failed to void hold of unrecorded payment"
            ),
        }
    }

    /// Captures the held funds once the client confirms.
    pub async fn confirm(&self, actor: &Actor, reference: &PaymentRef) -> Result<Payment> {
        let payment = find_payment(self.store.as_ref(), reference).await?;
        require_ownership(actor, payment.client_id, "payment")?;
        if payment.status != PaymentStatus::Pending {
            return Err(MarketError::conflict(format!(
                "payment {} is {}, only pending payments can be confirmed",
                payment.id, payment.status
            )));
        }

        let reserved = self.reserve(&payment, LedgerOperation::Capture).await?;
        let key = IdempotencyKey::for_payment(payment.id, LedgerOperation::Capture);
        if let Err(err) = self
            .call(
                LedgerOperation::Capture,
                self.ledger.capture(&payment.hold_ref, &key),
            )
            .await
        {
            warn!(payment_id = %payment.id, error = %err, "capture failed, payment stays pending");
            self.abandon(&reserved).await;
            return Err(err);
        }

        let now = Utc::now();
        let mut paid = reserved.clone();
        paid.mark_paid(now)?;
        let mut changes = Self::settle(&reserved).put(Record::Payment(paid.clone()));
        let project = self.store.project(paid.project_id).await?;
        if let Some(mut project) = project.clone()
            && project.status == ProjectStatus::Open
        {
            project.transition(ProjectStatus::InProgress, now)?;
            changes = changes
                .expect(Precondition::ProjectStatus {
                    id: project.id,
                    expected: ProjectStatus::Open,
                })
                .put(Record::Project(project));
        }
        self.store.commit(changes).await?;
        info!(payment_id = %paid.id, amount = %paid.amount(), "payment captured");

        if let Err(err) = self.invoices.generate(&PaymentRef::Id(paid.id)).await {
            warn!(payment_id = %paid.id, error = %err, "invoice generation failed after capture");
        }
        let title = project.map(|p| p.title).unwrap_or_default();
        self.notifier.notify(Notice::payment_required(
            paid.client_id,
            paid.project_id,
            &title,
            paid.amount(),
            paid.currency.clone(),
        ));
        Ok(paid)
    }

    /// Pays the expert their share once the work is complete.
    pub async fn release(&self, actor: &Actor, request: ReleaseRequest) -> Result<Payment> {
        let payment = self.load(request.payment_id).await?;
        require_ownership(actor, payment.client_id, "payment")?;
        if payment.status == PaymentStatus::Released || payment.transfer_ref().is_some() {
            return Err(MarketError::conflict(format!(
                "payment {} was already released",
                payment.id
            )));
        }
        if payment.project_id != request.project_id || payment.expert_id != request.expert_id {
            return Err(MarketError::BadRequest(
                "project or expert does not match the payment".to_string(),
            ));
        }
        if payment.status != PaymentStatus::Paid {
            return Err(MarketError::conflict(format!(
                "payment {} is {}, funds must be captured before release",
                payment.id, payment.status
            )));
        }
        let project = self
            .store
            .project(payment.project_id)
            .await?
            .ok_or_else(|| MarketError::not_found("project", payment.project_id))?;
        if project.status != ProjectStatus::Completed {
            return Err(MarketError::conflict(format!(
                "project {} is {}, work must be completed before release",
                project.id, project.status
            )));
        }
        let expert = self
            .store
            .user(payment.expert_id)
            .await?
            .ok_or_else(|| MarketError::not_found("user", payment.expert_id))?;
        let payee = expert.payee_account.ok_or_else(|| {
            MarketError::BadRequest(format!("expert {} has no payout account", expert.id))
        })?;

        let reserved = self.reserve(&payment, LedgerOperation::Transfer).await?;
        let transfer = TransferRequest {
            amount: payment.expert_amount(),
            currency: payment.currency.clone(),
            payee,
            metadata: LedgerMetadata::from([
                ("payment_id".to_string(), payment.id.to_string()),
                ("project_id".to_string(), payment.project_id.to_string()),
                ("expert_id".to_string(), payment.expert_id.to_string()),
            ]),
            idempotency_key: IdempotencyKey::for_payment(payment.id, LedgerOperation::Transfer),
        };
        let transfer_ref = match self
            .call(LedgerOperation::Transfer, self.ledger.transfer(transfer))
            .await
        {
            Ok(transfer_ref) => transfer_ref,
            Err(err) => {
                warn!(
                    payment_id = %payment.id,
                    error = %err,
                    "transfer failed, payment stays paid"
                );
                self.abandon(&reserved).await;
                return Err(err);
            }
        };

        let mut released = reserved.clone();
        released.mark_released(transfer_ref, Utc::now())?;
        self.store
            .commit(Self::settle(&reserved).put(Record::Payment(released.clone())))
            .await?;
        info!(
            payment_id = %released.id,
            expert_amount = %released.expert_amount(),
            transfer_ref = ?released.transfer_ref(),
            "payment released"
        );
        Ok(released)
    }

    /// Returns the client's money. Works on held and captured funds alike.
    pub async fn refund(&self, actor: &Actor, payment_id: PaymentId) -> Result<Payment> {
        require_admin(actor)?;
        let payment = self.load(payment_id).await?;
        if !payment.status.can_transition_to(PaymentStatus::Refunded) {
            return Err(MarketError::conflict(format!(
                "payment {} is {} and cannot be refunded",
                payment.id, payment.status
            )));
        }

        let reserved = self.reserve(&payment, LedgerOperation::Refund).await?;
        let key = IdempotencyKey::for_payment(payment.id, LedgerOperation::Refund);
        if let Err(err) = self
            .call(
                LedgerOperation::Refund,
                self.ledger.refund(&payment.hold_ref, None, &key),
            )
            .await
        {
            self.abandon(&reserved).await;
            return Err(err);
        }

        let mut refunded = reserved.clone();
        refunded.mark_refunded(Utc::now())?;
        self.store
            .commit(Self::settle(&reserved).put(Record::Payment(refunded.clone())))
            .await?;
        warn!(
            %payment_id,
            operator_id = %actor.user_id,
            amount = %refunded.amount(),
            "payment refunded by administrator"
        );
        Ok(refunded)
    }

    /// Freezes the escrow. No money moves.
    pub async fn dispute(&self, actor: &Actor, payment_id: PaymentId) -> Result<Payment> {
        let payment = self.load(payment_id).await?;
        let party = actor.user_id == payment.client_id || actor.user_id == payment.expert_id;
        if !party && actor.role != Role::Admin {
            return Err(MarketError::Forbidden(
                "only the parties of a payment can dispute it".to_string(),
            ));
        }
        if let Some(reservation) = &payment.reservation
            && !reservation.is_expired(Utc::now(), self.config.lease())
        {
            return Err(MarketError::conflict(format!(
                "payment {} has a {} in progress",
                payment.id, reservation.operation
            )));
        }

        let mut disputed = payment.clone();
        disputed.mark_disputed(Utc::now())?;
        self.store
            .commit(Self::settle(&payment).put(Record::Payment(disputed.clone())))
            .await?;
        warn!(%payment_id, raised_by = %actor.user_id, "payment disputed");
        Ok(disputed)
    }

    /// Payments visible to the actor with aggregate figures.
    pub async fn history(&self, actor: &Actor) -> Result<PaymentHistory> {
        let filter = match actor.role {
            Role::Client => PaymentFilter {
                client_id: Some(actor.user_id),
                ..Default::default()
            },
            Role::Expert => PaymentFilter {
                expert_id: Some(actor.user_id),
                ..Default::default()
            },
            Role::Admin => PaymentFilter::default(),
        };
        let payments = self.store.payments(&filter).await?;
        let stats = PaymentStats::tally(&payments);
        Ok(PaymentHistory { payments, stats })
    }
}
