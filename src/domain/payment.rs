use super::ledger::{HoldRef, LedgerOperation, TransferRef};
use super::money::{Currency, Money, Split};
use super::{PaymentId, ProjectId, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Released,
    Refunded,
    Disputed,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Paid, Released)
                | (Pending | Paid, Refunded)
                | (Pending | Paid, Disputed)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Released => "released",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Disputed => "disputed",
        };
        f.write_str(name)
    }
}

/// Marks a ledger call in flight for this payment. Taken with a guarded
/// commit before the call and cleared by the commit that records the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub operation: LedgerOperation,
    pub token: Uuid,
    pub reserved_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_expired(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        self.reserved_at + lease <= now
    }
}

/// Either way of pointing at a payment: its id or the processor hold reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRef {
    Id(PaymentId),
    Hold(HoldRef),
}

impl fmt::Display for PaymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentRef::Id(id) => write!(f, "{id}"),
            PaymentRef::Hold(hold) => write!(f, "{hold}"),
        }
    }
}

/// The escrow record tying money to a project.
///
/// The split fields and the transfer reference are private: the split is
/// fixed by [`Payment::new`] and the transfer reference can only be written
/// once through [`Payment::mark_released`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub project_id: ProjectId,
    pub client_id: UserId,
    pub expert_id: UserId,
    amount: Money,
    commission: Money,
    expert_amount: Money,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub hold_ref: HoldRef,
    transfer_ref: Option<TransferRef>,
    pub reservation: Option<Reservation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

pub struct NewPayment {
    pub id: PaymentId,
    pub project_id: ProjectId,
    pub client_id: UserId,
    pub expert_id: UserId,
    pub amount: Money,
    pub split: Split,
    pub currency: Currency,
    pub hold_ref: HoldRef,
}

impl Payment {
    pub fn new(new: NewPayment, now: DateTime<Utc>) -> Result<Self> {
        if new.split.commission + new.split.expert_amount != new.amount {
            return Err(MarketError::BadRequest(format!(
                "split {} + {} does not add up to {}",
                new.split.commission, new.split.expert_amount, new.amount
            )));
        }
        Ok(Self {
            id: new.id,
            project_id: new.project_id,
            client_id: new.client_id,
            expert_id: new.expert_id,
            amount: new.amount,
            commission: new.split.commission,
            expert_amount: new.split.expert_amount,
            currency: new.currency,
            status: PaymentStatus::Pending,
            hold_ref: new.hold_ref,
            transfer_ref: None,
            reservation: None,
            created_at: now,
            updated_at: now,
            released_at: None,
        })
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn commission(&self) -> Money {
        self.commission
    }

    pub fn expert_amount(&self) -> Money {
        self.expert_amount
    }

    pub fn transfer_ref(&self) -> Option<&TransferRef> {
        self.transfer_ref.as_ref()
    }

    pub fn split_is_consistent(&self) -> bool {
        self.commission + self.expert_amount == self.amount
    }

    /// Claims the payment for one ledger call. Fails if another call holds a
    /// reservation whose lease has not run out.
    pub fn reserve(
        &mut self,
        operation: LedgerOperation,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Reservation> {
        if let Some(current) = &self.reservation
            && !current.is_expired(now, lease)
        {
            return Err(MarketError::conflict(format!(
                "payment {} has a {} in progress",
                self.id, current.operation
            )));
        }
        let reservation = Reservation {
            operation,
            token: Uuid::new_v4(),
            reserved_at: now,
        };
        self.reservation = Some(reservation);
        self.updated_at = now;
        Ok(reservation)
    }

    pub fn clear_reservation(&mut self, now: DateTime<Utc>) {
        self.reservation = None;
        self.updated_at = now;
    }

    fn advance(&mut self, next: PaymentStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(MarketError::conflict(format!(
                "payment {} is {} and cannot become {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.reservation = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.advance(PaymentStatus::Paid, now)
    }

    pub fn mark_released(&mut self, transfer_ref: TransferRef, now: DateTime<Utc>) -> Result<()> {
        if self.transfer_ref.is_some() {
            return Err(MarketError::conflict(format!(
                "payment {} was already released",
                self.id
            )));
        }
        self.advance(PaymentStatus::Released, now)?;
        self.transfer_ref = Some(transfer_ref);
        self.released_at = Some(now);
        Ok(())
    }

    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.advance(PaymentStatus::Refunded, now)
    }

    pub fn mark_disputed(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.advance(PaymentStatus::Disputed, now)
    }
}

/// Role-scoped aggregate over a payment listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PaymentStats {
    pub total_payments: usize,
    pub total_amount: Money,
    pub total_commission: Money,
    pub pending_amount: Money,
    pub paid_amount: Money,
    pub released_amount: Money,
}

impl PaymentStats {
    pub fn tally<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        payments
            .into_iter()
            .fold(PaymentStats::default(), |mut stats, p| {
                stats.total_payments += 1;
                stats.total_amount += p.amount;
                stats.total_commission += p.commission;
                match p.status {
                    PaymentStatus::Pending => stats.pending_amount += p.amount,
                    PaymentStatus::Paid => stats.paid_amount += p.amount,
                    PaymentStatus::Released => stats.released_amount += p.expert_amount,
                    PaymentStatus::Refunded | PaymentStatus::Disputed => {}
                }
                stats
            })
    }
}
