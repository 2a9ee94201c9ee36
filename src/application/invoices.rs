use super::payments::find_payment;
use crate::config::MarketConfig;
use crate::domain::invoice::{
    Audience, Invoice, InvoiceDocument, InvoiceLine, Party, invoice_id_for, invoice_number,
};
use crate::domain::money::Money;
use crate::domain::payment::{Payment, PaymentRef, PaymentStatus};
use crate::domain::ports::{MarketStoreHandle, RendererHandle};
use crate::domain::project::Project;
use crate::domain::store::{ChangeSet, InvoiceFilter, Precondition, Record, RecordKey};
use crate::domain::user::{Actor, Role, UserProfile};
use crate::error::{MarketError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

/// Builds and stores the billing documents for a captured payment.
#[derive(Clone)]
pub struct InvoiceGenerator {
    store: MarketStoreHandle,
    renderer: RendererHandle,
    vat_rate: Decimal,
    seller_receipts: bool,
}

impl InvoiceGenerator {
    pub fn new(store: MarketStoreHandle, renderer: RendererHandle, config: &MarketConfig) -> Self {
        Self {
            store,
            renderer,
            vat_rate: config.vat_rate,
            seller_receipts: config.seller_receipts,
        }
    }

    async fn profile(&self, id: uuid::Uuid) -> Result<UserProfile> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| MarketError::not_found("user", id))
    }

    /// Generates the one invoice a payment may have. Runs without an actor:
    /// it is triggered internally right after a capture.
    pub async fn generate(&self, reference: &PaymentRef) -> Result<Invoice> {
        let payment = find_payment(self.store.as_ref(), reference).await?;
        if !matches!(payment.status, PaymentStatus::Paid | PaymentStatus::Released) {
            return Err(MarketError::conflict(format!(
                "payment {} is {}, only captured payments are invoiced",
                payment.id, payment.status
            )));
        }
        let id = invoice_id_for(payment.id);
        if self.store.invoice(id).await?.is_some() {
            return Err(MarketError::conflict_with(
                format!("payment {} already has an invoice", payment.id),
                id,
            ));
        }

        let project = self
            .store
            .project(payment.project_id)
            .await?
            .ok_or_else(|| MarketError::not_found("project", payment.project_id))?;
        let buyer = self.profile(payment.client_id).await?;
        let seller = self.profile(payment.expert_id).await?;
        let vat = payment.amount().apply_rate(self.vat_rate)?;

        let buyer_document = self
            .renderer
            .render(&self.buyer_document(&payment, &project, &buyer, vat))
            .await?;
        let seller_document = if self.seller_receipts {
            Some(
                self.renderer
                    .render(&self.seller_document(&payment, &project, &seller))
                    .await?,
            )
        } else {
            None
        };

        let invoice = Invoice {
            id,
            payment_id: payment.id,
            buyer_id: buyer.id,
            seller_id: seller.id,
            amount: payment.amount(),
            commission_amount: payment.commission(),
            vat,
            currency: payment.currency.clone(),
            buyer_document,
            seller_document,
            created_at: Utc::now(),
        };
        self.store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::Absent(RecordKey::Invoice(invoice.id)))
                    .put(Record::Invoice(invoice.clone())),
            )
            .await?;

        info!(
            invoice = %invoice.number(),
            payment_id = %payment.id,
            total = %(invoice.amount + invoice.vat),
            "invoice generated"
        );
        Ok(invoice)
    }

    /// Caller-facing variant: the actor must be a party of the payment or an admin.
    pub async fn generate_for(&self, actor: &Actor, reference: &PaymentRef) -> Result<Invoice> {
        let payment = find_payment(self.store.as_ref(), reference).await?;
        let party = actor.user_id == payment.client_id || actor.user_id == payment.expert_id;
        if !party && actor.role != Role::Admin {
            return Err(MarketError::Forbidden(
                "only the parties of a payment can invoice it".to_string(),
            ));
        }
        self.generate(&PaymentRef::Id(payment.id)).await
    }

    pub async fn list_for(&self, actor: &Actor) -> Result<Vec<Invoice>> {
        self.store
            .invoices(&InvoiceFilter {
                party_id: Some(actor.user_id),
                payment_id: None,
            })
            .await
    }

    fn buyer_document(
        &self,
        payment: &Payment,
        project: &Project,
        buyer: &UserProfile,
        vat: Money,
    ) -> InvoiceDocument {
        let issued_on = Utc::now().date_naive();
        let mut lines = vec![InvoiceLine {
            description: format!("Automation service: {}", project.title),
            amount: payment.amount(),
        }];
        if vat.is_positive() {
            lines.push(InvoiceLine {
                description: format!(
                    "VAT ({}%)",
                    (self.vat_rate * Decimal::ONE_HUNDRED).normalize()
                ),
                amount: vat,
            });
        }
        if payment.commission().is_positive() {
            lines.push(InvoiceLine {
                description: "Platform commission (included)".to_string(),
                amount: payment.commission(),
            });
        }
        InvoiceDocument {
            number: invoice_number(invoice_id_for(payment.id)),
            audience: Audience::Buyer,
            issued_on,
            due_on: InvoiceDocument::due_date(issued_on),
            party: Party {
                name: buyer.full_name.clone(),
                email: buyer.email.clone(),
            },
            project_title: project.title.clone(),
            project_description: project.description.clone(),
            currency: payment.currency.clone(),
            lines,
            total: payment.amount() + vat,
        }
    }

    fn seller_document(
        &self,
        payment: &Payment,
        project: &Project,
        seller: &UserProfile,
    ) -> InvoiceDocument {
        let issued_on = Utc::now().date_naive();
        InvoiceDocument {
            number: invoice_number(invoice_id_for(payment.id)),
            audience: Audience::Seller,
            issued_on,
            due_on: InvoiceDocument::due_date(issued_on),
            party: Party {
                name: seller.full_name.clone(),
                email: seller.email.clone(),
            },
            project_title: project.title.clone(),
            project_description: project.description.clone(),
            currency: payment.currency.clone(),
            lines: vec![InvoiceLine {
                description: format!("Payout for {}", project.title),
                amount: payment.expert_amount(),
            }],
            total: payment.expert_amount(),
        }
    }
}
