//! Serializable requests accepted by [`MarketEngine`](super::engine::MarketEngine).

use crate::domain::ledger::HoldRef;
use crate::domain::money::Money;
use crate::domain::payment::PaymentRef;
use crate::domain::project::ProjectCategory;
use crate::domain::proposal::ProposalStatus;
use crate::domain::{
    ContractId, ConversationId, MessageId, NotificationId, PaymentId, ProjectId, ProposalId, UserId,
};
use crate::error::{MarketError, Result};
use chrono::NaiveDate;
use serde::Deserialize;

/// One command line: who is asking, and what.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub actor: Option<UserId>,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    PostProject {
        #[serde(default)]
        id: Option<ProjectId>,
        title: String,
        #[serde(default)]
        description: String,
        category: ProjectCategory,
        #[serde(default)]
        budget: Option<Money>,
        #[serde(default)]
        deadline: Option<NaiveDate>,
    },
    CancelProject {
        project_id: ProjectId,
    },
    CreateProposal {
        #[serde(default)]
        id: Option<ProposalId>,
        project_id: ProjectId,
        price: Money,
        estimated_days: u32,
        #[serde(default)]
        message: String,
    },
    UpdateProposalStatus {
        proposal_id: ProposalId,
        status: ProposalStatus,
    },
    CompleteContract {
        contract_id: ContractId,
    },
    ForceCompleteContract {
        contract_id: ContractId,
    },
    AuthorizePayment {
        #[serde(default)]
        id: Option<PaymentId>,
        project_id: ProjectId,
        expert_id: UserId,
        amount: Money,
    },
    ConfirmPayment {
        #[serde(default)]
        payment_id: Option<PaymentId>,
        #[serde(default)]
        hold_ref: Option<HoldRef>,
    },
    ReleasePayment {
        payment_id: PaymentId,
        project_id: ProjectId,
        expert_id: UserId,
    },
    RefundPayment {
        payment_id: PaymentId,
    },
    DisputePayment {
        payment_id: PaymentId,
    },
    GenerateInvoice {
        #[serde(default)]
        payment_id: Option<PaymentId>,
        #[serde(default)]
        hold_ref: Option<HoldRef>,
    },
    ListProposals {
        #[serde(default)]
        project_id: Option<ProjectId>,
    },
    PaymentHistory {},
    ListInvoices {},
    ListNotifications {
        #[serde(default)]
        unread_only: bool,
        #[serde(default)]
        limit: Option<usize>,
    },
    MarkNotificationRead {
        notification_id: NotificationId,
    },
    MarkAllNotificationsRead {},
    OpenConversation {
        project_id: ProjectId,
    },
    SendMessage {
        #[serde(default)]
        id: Option<MessageId>,
        conversation_id: ConversationId,
        text: String,
    },
    ListMessages {
        conversation_id: ConversationId,
    },
    ListConversations {},
    ExportUserData {},
}

/// Picks the payment reference out of a command's `payment_id` / `hold_ref` pair.
pub fn payment_ref(
    payment_id: Option<PaymentId>,
    hold_ref: Option<HoldRef>,
) -> Result<PaymentRef> {
    match (payment_id, hold_ref) {
        (Some(id), _) => Ok(PaymentRef::Id(id)),
        (None, Some(hold)) => Ok(PaymentRef::Hold(hold)),
        (None, None) => Err(MarketError::BadRequest(
            "either payment_id or hold_ref is required".to_string(),
        )),
    }
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::PostProject { .. } => "post_project",
            Command::CancelProject { .. } => "cancel_project",
            Command::CreateProposal { .. } => "create_proposal",
            Command::UpdateProposalStatus { .. } => "update_proposal_status",
            Command::CompleteContract { .. } => "complete_contract",
            Command::ForceCompleteContract { .. } => "force_complete_contract",
            Command::AuthorizePayment { .. } => "authorize_payment",
            Command::ConfirmPayment { .. } => "confirm_payment",
            Command::ReleasePayment { .. } => "release_payment",
            Command::RefundPayment { .. } => "refund_payment",
            Command::DisputePayment { .. } => "dispute_payment",
            Command::GenerateInvoice { .. } => "generate_invoice",
            Command::ListProposals { .. } => "list_proposals",
            Command::PaymentHistory {} => "payment_history",
            Command::ListInvoices {} => "list_invoices",
            Command::ListNotifications { .. } => "list_notifications",
            Command::MarkNotificationRead { .. } => "mark_notification_read",
            Command::MarkAllNotificationsRead {} => "mark_all_notifications_read",
            Command::OpenConversation { .. } => "open_conversation",
            Command::SendMessage { .. } => "send_message",
            Command::ListMessages { .. } => "list_messages",
            Command::ListConversations {} => "list_conversations",
            Command::ExportUserData {} => "export_user_data",
        }
    }
}
