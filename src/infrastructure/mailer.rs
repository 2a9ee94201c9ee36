use crate::domain::notification::Notification;
use crate::domain::ports::Mailer;
use crate::domain::user::UserProfile;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Stands in for the transactional email provider: every delivery becomes a
/// structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn deliver(&self, recipient: &UserProfile, notification: &Notification) -> Result<()> {
        info!(
            to = %recipient.email,
            kind = ?notification.kind,
            notification_id = %notification.id,
            action_url = %notification.payload.action_url,
            "email: {}",
            notification.describe()
        );
        Ok(())
    }
}
