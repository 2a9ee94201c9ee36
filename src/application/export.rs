//! Personal data export: everything the store holds about one user.

use crate::domain::UserId;
use crate::domain::contract::Contract;
use crate::domain::conversation::{Conversation, Message};
use crate::domain::invoice::Invoice;
use crate::domain::notification::Notification;
use crate::domain::payment::Payment;
use crate::domain::ports::MarketStore;
use crate::domain::project::Project;
use crate::domain::proposal::Proposal;
use crate::domain::store::{
    ContractFilter, ConversationFilter, InvoiceFilter, MessageFilter, NotificationFilter,
    PaymentFilter, ProjectFilter, ProposalFilter,
};
use crate::domain::user::{Actor, UserProfile};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportTotals {
    pub projects: usize,
    pub proposals: usize,
    pub contracts: usize,
    pub payments: usize,
    pub invoices: usize,
    pub conversations: usize,
    pub messages: usize,
    pub notifications: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDataExport {
    pub export_date: DateTime<Utc>,
    pub user_id: UserId,
    pub profile: UserProfile,
    pub projects: Vec<Project>,
    pub proposals: Vec<Proposal>,
    pub contracts: Vec<Contract>,
    pub payments: Vec<Payment>,
    pub invoices: Vec<Invoice>,
    pub conversations: Vec<Conversation>,
    /// Messages the user wrote.
    pub messages: Vec<Message>,
    pub notifications: Vec<Notification>,
    pub totals: ExportTotals,
}

/// Collects the caller's own data. There is no way to export someone else's.
pub async fn export_user_data(store: &dyn MarketStore, actor: &Actor) -> Result<UserDataExport> {
    let user_id = actor.user_id;
    let profile = store
        .user(user_id)
        .await?
        .ok_or_else(|| MarketError::not_found("user", user_id))?;

    let projects = store
        .projects(&ProjectFilter {
            owner_id: Some(user_id),
            status: None,
        })
        .await?;
    let proposals = store
        .proposals(&ProposalFilter {
            expert_id: Some(user_id),
            ..Default::default()
        })
        .await?;
    let contracts = store
        .contracts(&ContractFilter {
            party_id: Some(user_id),
            project_id: None,
        })
        .await?;
    let mut payments = store
        .payments(&PaymentFilter {
            client_id: Some(user_id),
            ..Default::default()
        })
        .await?;
    payments.extend(
        store
            .payments(&PaymentFilter {
                expert_id: Some(user_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|p| p.client_id != user_id),
    );
    payments.sort_by_key(|p| std::cmp::Reverse(p.created_at));
    let invoices = store
        .invoices(&InvoiceFilter {
            party_id: Some(user_id),
            payment_id: None,
        })
        .await?;
    let conversations = store
        .conversations(&ConversationFilter {
            participant_id: Some(user_id),
            project_id: None,
        })
        .await?;
    let messages = store
        .messages(&MessageFilter {
            conversation_id: None,
            sender_id: Some(user_id),
        })
        .await?;
    let notifications = store
        .notifications(&NotificationFilter {
            recipient_id: Some(user_id),
            ..Default::default()
        })
        .await?;

    let totals = ExportTotals {
        projects: projects.len(),
        proposals: proposals.len(),
        contracts: contracts.len(),
        payments: payments.len(),
        invoices: invoices.len(),
        conversations: conversations.len(),
        messages: messages.len(),
        notifications: notifications.len(),
    };
    info!(%user_id, ?totals, "user data exported");
    Ok(UserDataExport {
        export_date: Utc::now(),
        user_id,
        profile,
        projects,
        proposals,
        contracts,
        payments,
        invoices,
        conversations,
        messages,
        notifications,
        totals,
    })
}
