use super::money::{Currency, Money};
use super::{NotificationId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    NewMessage,
    NewProposal,
    ProposalAccepted,
    PaymentRequired,
    ReviewRequest,
}

/// Event-specific context, enough to render a message and a deep link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub project_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expert_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    pub action_url: String,
}

/// A notification waiting to be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
}

impl Notice {
    pub fn new_message(
        recipient_id: UserId,
        sender_id: UserId,
        conversation_id: Uuid,
        project_title: &str,
    ) -> Self {
        Self {
            recipient_id,
            kind: NotificationKind::NewMessage,
            payload: NotificationPayload {
                project_title: project_title.to_string(),
                sender_id: Some(sender_id),
                conversation_id: Some(conversation_id),
                action_url: format!("/conversations/{conversation_id}"),
                ..Default::default()
            },
        }
    }

    pub fn new_proposal(
        client_id: UserId,
        expert_id: UserId,
        project_id: ProjectId,
        project_title: &str,
    ) -> Self {
        Self {
            recipient_id: client_id,
            kind: NotificationKind::NewProposal,
            payload: NotificationPayload {
                project_id: Some(project_id),
                project_title: project_title.to_string(),
                expert_id: Some(expert_id),
                action_url: "/proposals".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn proposal_accepted(
        expert_id: UserId,
        project_id: ProjectId,
        project_title: &str,
    ) -> Self {
        Self {
            recipient_id: expert_id,
            kind: NotificationKind::ProposalAccepted,
            payload: NotificationPayload {
                project_id: Some(project_id),
                project_title: project_title.to_string(),
                action_url: "/proposals".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn payment_required(
        client_id: UserId,
        project_id: ProjectId,
        project_title: &str,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self {
            recipient_id: client_id,
            kind: NotificationKind::PaymentRequired,
            payload: NotificationPayload {
                project_id: Some(project_id),
                project_title: project_title.to_string(),
                amount: Some(amount),
                currency: Some(currency),
                action_url: "/payments".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn review_request(client_id: UserId, project_id: ProjectId, project_title: &str) -> Self {
        Self {
            recipient_id: client_id,
            kind: NotificationKind::ReviewRequest,
            payload: NotificationPayload {
                project_id: Some(project_id),
                project_title: project_title.to_string(),
                action_url: "/proposals".to_string(),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_notice(notice: Notice, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: notice.recipient_id,
            kind: notice.kind,
            payload: notice.payload,
            read: false,
            created_at: now,
        }
    }

    /// One-line human readable text, used for the inbox and the email subject.
    pub fn describe(&self) -> String {
        let title = &self.payload.project_title;
        match self.kind {
            NotificationKind::NewMessage => format!("New message on project \"{title}\""),
            NotificationKind::NewProposal => format!("New proposal received for \"{title}\""),
            NotificationKind::ProposalAccepted => {
                format!("Your proposal for \"{title}\" has been accepted")
            }
            NotificationKind::PaymentRequired => {
                match (&self.payload.amount, &self.payload.currency) {
                    (Some(amount), Some(currency)) => format!(
                        "Payment required for \"{title}\" - {amount} {}",
                        currency.as_str().to_uppercase()
                    ),
                    _ => format!("Payment required for \"{title}\""),
                }
            }
            NotificationKind::ReviewRequest => format!("Review requested for \"{title}\""),
        }
    }
}
