use super::guards::require_role;
use super::notifications::NotificationDispatcher;
use crate::domain::conversation::{Conversation, Message, conversation_id_for};
use crate::domain::notification::Notice;
use crate::domain::ports::MarketStoreHandle;
use crate::domain::store::{
    ChangeSet, ConversationFilter, MessageFilter, Precondition, Record, RecordKey,
};
use crate::domain::user::{Actor, Role};
use crate::domain::{ConversationId, MessageId, ProjectId};
use crate::error::{MarketError, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Option<MessageId>,
    pub conversation_id: ConversationId,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Client/expert conversations about a project.
#[derive(Clone)]
pub struct MessageCenter {
    store: MarketStoreHandle,
    notifier: NotificationDispatcher,
}

impl MessageCenter {
    pub fn new(store: MarketStoreHandle, notifier: NotificationDispatcher) -> Self {
        Self { store, notifier }
    }

    /// Loads the conversation and checks the actor may read it. Admins may
    /// read every thread but never post.
    async fn visible(&self, actor: &Actor, id: ConversationId) -> Result<Conversation> {
        let conversation = self
            .store
            .conversation(id)
            .await?
            .ok_or_else(|| MarketError::not_found("conversation", id))?;
        if !conversation.has_participant(actor.user_id) && actor.role != Role::Admin {
            return Err(MarketError::Forbidden(
                "caller is not part of this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }

    /// An expert contacts a project's client. Returns the existing thread
    /// when the pair already talked.
    pub async fn open(&self, actor: &Actor, project_id: ProjectId) -> Result<Conversation> {
        require_role(actor, Role::Expert)?;
        let id = conversation_id_for(project_id, actor.user_id);
        if let Some(existing) = self.store.conversation(id).await? {
            return Ok(existing);
        }
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| MarketError::not_found("project", project_id))?;

        let conversation = Conversation::open(&project, actor.user_id, Utc::now());
        let created = self
            .store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::Absent(RecordKey::Conversation(id)))
                    .put(Record::Conversation(conversation.clone())),
            )
            .await;
        match created {
            Ok(_) => {
                info!(
                    conversation_id = %id,
                    %project_id,
                    expert_id = %actor.user_id,
                    "conversation opened"
                );
                Ok(conversation)
            }
            Err(MarketError::Conflict { .. }) => self
                .store
                .conversation(id)
                .await?
                .ok_or_else(|| MarketError::not_found("conversation", id)),
            Err(err) => Err(err),
        }
    }

    pub async fn send(&self, actor: &Actor, new: NewMessage) -> Result<Message> {
        let conversation = self.visible(actor, new.conversation_id).await?;
        let recipient = conversation.counterpart(actor.user_id).ok_or_else(|| {
            MarketError::Forbidden("only participants can post to a conversation".to_string())
        })?;
        let message = Message::new(
            new.id.unwrap_or_else(Uuid::new_v4),
            conversation.id,
            actor.user_id,
            &new.text,
            Utc::now(),
        )?;
        self.store
            .commit(
                ChangeSet::new()
                    .expect(Precondition::Absent(RecordKey::Message(message.id)))
                    .put(Record::Message(message.clone())),
            )
            .await?;

        info!(message_id = %message.id, conversation_id = %conversation.id, "message sent");
        match self.store.project(conversation.project_id).await {
            Ok(Some(project)) => self.notifier.notify(Notice::new_message(
                recipient,
                actor.user_id,
                conversation.id,
                &project.title,
            )),
            Ok(None) => {}
            Err(err) => {
                warn!(
                    conversation_id = %conversation.id,
                    error = %err,
                    "skipping message notification"
                );
            }
        }
        Ok(message)
    }

    pub async fn thread(&self, actor: &Actor, id: ConversationId) -> Result<Thread> {
        let conversation = self.visible(actor, id).await?;
        let messages = self
            .store
            .messages(&MessageFilter {
                conversation_id: Some(conversation.id),
                sender_id: None,
            })
            .await?;
        Ok(Thread {
            conversation,
            messages,
        })
    }

    pub async fn list(&self, actor: &Actor) -> Result<Vec<Conversation>> {
        let participant_id = match actor.role {
            Role::Admin => None,
            Role::Client | Role::Expert => Some(actor.user_id),
        };
        self.store
            .conversations(&ConversationFilter {
                participant_id,
                project_id: None,
            })
            .await
    }
}
