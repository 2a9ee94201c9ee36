use crate::domain::money::Money;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Serialize)]
struct PaymentRow<'a> {
    id: Uuid,
    project_id: Uuid,
    client_id: Uuid,
    expert_id: Uuid,
    amount: Money,
    commission: Money,
    expert_amount: Money,
    currency: &'a str,
    status: PaymentStatus,
    hold_ref: &'a str,
    transfer_ref: Option<&'a str>,
    created_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Payment> for PaymentRow<'a> {
    fn from(payment: &'a Payment) -> Self {
        Self {
            id: payment.id,
            project_id: payment.project_id,
            client_id: payment.client_id,
            expert_id: payment.expert_id,
            amount: payment.amount(),
            commission: payment.commission(),
            expert_amount: payment.expert_amount(),
            currency: payment.currency.as_str(),
            status: payment.status,
            hold_ref: &payment.hold_ref.0,
            transfer_ref: payment.transfer_ref().map(|t| t.0.as_str()),
            created_at: payment.created_at,
            released_at: payment.released_at,
        }
    }
}

/// Writes payments as CSV with a header row.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments<'a>(
        &mut self,
        payments: impl IntoIterator<Item = &'a Payment>,
    ) -> Result<()> {
        for payment in payments {
            self.writer.serialize(PaymentRow::from(payment))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
