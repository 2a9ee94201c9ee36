use crate::domain::invoice::{Audience, DocumentRef, InvoiceDocument};
use crate::domain::ports::DocumentRenderer;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Renders billing documents as plain text and keeps them in memory,
/// addressed by `docs/<number>-<audience>.txt`.
#[derive(Default, Clone)]
pub struct TextInvoiceRenderer {
    documents: Arc<RwLock<HashMap<DocumentRef, String>>>,
}

impl TextInvoiceRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document(&self, reference: &DocumentRef) -> Option<String> {
        let documents = self.documents.read().await;
        documents.get(reference).cloned()
    }

    pub async fn count(&self) -> usize {
        self.documents.read().await.len()
    }
}

fn layout(document: &InvoiceDocument) -> String {
    let currency = document.currency.as_str().to_uppercase();
    let heading = match document.audience {
        Audience::Buyer => "INVOICE",
        Audience::Seller => "PAYMENT RECEIPT",
    };
    let mut lines = vec![
        format!("{heading} {}", document.number),
        format!("Issued: {}", document.issued_on),
        format!("Due: {}", document.due_on),
        format!("To: {} <{}>", document.party.name, document.party.email),
        format!("Project: {}", document.project_title),
    ];
    if !document.project_description.is_empty() {
        lines.push(format!("  {}", document.project_description));
    }
    lines.push(String::new());
    for line in &document.lines {
        lines.push(format!(
            "{:<40} {:>12} {currency}",
            line.description,
            line.amount.to_string()
        ));
    }
    lines.push(format!(
        "{:<40} {:>12} {currency}",
        "TOTAL",
        document.total.to_string()
    ));
    lines.join("\n") + "\n"
}

#[async_trait]
impl DocumentRenderer for TextInvoiceRenderer {
    async fn render(&self, document: &InvoiceDocument) -> Result<DocumentRef> {
        let audience = match document.audience {
            Audience::Buyer => "buyer",
            Audience::Seller => "seller",
        };
        let reference = DocumentRef(format!("docs/{}-{audience}.txt", document.number));
        let text = layout(document);
        let mut documents = self.documents.write().await;
        documents.insert(reference.clone(), text);
        Ok(reference)
    }
}
