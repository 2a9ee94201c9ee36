use super::money::{Currency, Money};
use super::{InvoiceId, PaymentId, UserId};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const INVOICE_NAMESPACE: Uuid = Uuid::from_u128(0x0b8f_41d2_93a7_4e55_b6c0_7d14_e2a9_5c02);

pub const PAYMENT_TERMS_DAYS: i64 = 30;

/// Invoice ids are derived from the payment, which caps invoices at one per payment.
pub fn invoice_id_for(payment_id: PaymentId) -> InvoiceId {
    Uuid::new_v5(&INVOICE_NAMESPACE, payment_id.as_bytes())
}

/// Opaque handle returned by the document renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(pub String);

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub payment_id: PaymentId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Money,
    pub commission_amount: Money,
    pub vat: Money,
    pub currency: Currency,
    pub buyer_document: DocumentRef,
    pub seller_document: Option<DocumentRef>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn number(&self) -> String {
        invoice_number(self.id)
    }
}

pub fn invoice_number(id: InvoiceId) -> String {
    let simple = id.simple().to_string();
    format!("INV-{}", simple[..8].to_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// The paying client's invoice: gross amount, commission and VAT lines.
    Buyer,
    /// The expert's receipt: net amount only.
    Seller,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLine {
    pub description: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Party {
    pub name: String,
    pub email: String,
}

/// Everything the renderer needs to lay out one billing document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDocument {
    pub number: String,
    pub audience: Audience,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
    pub party: Party,
    pub project_title: String,
    pub project_description: String,
    pub currency: Currency,
    pub lines: Vec<InvoiceLine>,
    pub total: Money,
}

impl InvoiceDocument {
    pub fn due_date(issued_on: NaiveDate) -> NaiveDate {
        issued_on + Duration::days(PAYMENT_TERMS_DAYS)
    }
}
