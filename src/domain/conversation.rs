use super::project::Project;
use super::{ConversationId, MessageId, ProjectId, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const CONVERSATION_NAMESPACE: Uuid = Uuid::from_u128(0x3c5d_9e21_7a4b_4f08_8d62_b1e0_f4a7_2c03);

/// Longest message body accepted, in characters.
pub const MAX_MESSAGE_LEN: usize = 5_000;

/// One thread per (project, expert) pair, so the id is derived from both.
pub fn conversation_id_for(project_id: ProjectId, expert_id: UserId) -> ConversationId {
    let mut name = [0u8; 32];
    name[..16].copy_from_slice(project_id.as_bytes());
    name[16..].copy_from_slice(expert_id.as_bytes());
    Uuid::new_v5(&CONVERSATION_NAMESPACE, &name)
}

/// A private thread between a project's client and one expert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub project_id: ProjectId,
    pub client_id: UserId,
    pub expert_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn open(project: &Project, expert_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: conversation_id_for(project.id, expert_id),
            project_id: project.id,
            client_id: project.owner_id,
            expert_id,
            created_at: now,
        }
    }

    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.client_id == user_id || self.expert_id == user_id
    }

    /// The participant on the other side of `user_id`.
    pub fn counterpart(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.client_id {
            Some(self.expert_id)
        } else if user_id == self.expert_id {
            Some(self.client_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Trims `text` and rejects empty or oversized bodies.
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MarketError::BadRequest("message text is required".to_string()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(MarketError::BadRequest(format!(
                "message is longer than {MAX_MESSAGE_LEN} characters"
            )));
        }
        Ok(Self {
            id,
            conversation_id,
            sender_id,
            text: text.to_string(),
            created_at: now,
        })
    }
}
