use super::guards::require_ownership;
use crate::domain::NotificationId;
use crate::domain::notification::{Notice, Notification};
use crate::domain::ports::{MailerHandle, MarketStoreHandle};
use crate::domain::store::{ChangeSet, NotificationFilter, Record};
use crate::domain::user::Actor;
use crate::error::{MarketError, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Inbox page size when the caller does not ask for one.
pub const DEFAULT_INBOX_LIMIT: usize = 50;

enum Job {
    Deliver(Notice),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget notification queue.
///
/// `notify` never blocks and never fails the caller. A single worker task
/// persists each notification and hands it to the mailer; any failure along
/// the way is logged and the notice dropped.
#[derive(Clone)]
pub struct NotificationDispatcher {
    jobs: mpsc::UnboundedSender<Job>,
}

impl NotificationDispatcher {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(store: MarketStoreHandle, mailer: MailerHandle) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(queue, store, mailer));
        Self { jobs }
    }

    pub fn notify(&self, notice: Notice) {
        if self.jobs.send(Job::Deliver(notice)).is_err() {
            warn!("notification worker is gone, dropping notice");
        }
    }

    /// Waits until every notice enqueued before this call has been handled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.jobs.send(Job::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run_worker(
    mut queue: mpsc::UnboundedReceiver<Job>,
    store: MarketStoreHandle,
    mailer: MailerHandle,
) {
    while let Some(job) = queue.recv().await {
        match job {
            Job::Deliver(notice) => deliver(&store, &mailer, notice).await,
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("notification worker stopped");
}

async fn deliver(store: &MarketStoreHandle, mailer: &MailerHandle, notice: Notice) {
    let notification = Notification::from_notice(notice, Utc::now());
    let recipient_id = notification.recipient_id;

    if let Err(err) = store
        .commit(ChangeSet::new().put(Record::Notification(notification.clone())))
        .await
    {
        warn!(
            %recipient_id,
            kind = ?notification.kind,
            error = %err,
            "failed to store notification"
        );
    }

    match store.user(recipient_id).await {
        Ok(Some(profile)) => {
            if let Err(err) = mailer.deliver(&profile, &notification).await {
                warn!(
                    %recipient_id,
                    kind = ?notification.kind,
                    error = %err,
                    "failed to send notification email"
                );
            }
        }
        Ok(None) => warn!(%recipient_id, "notification recipient has no profile, skipping email"),
        Err(err) => warn!(%recipient_id, error = %err, "failed to look up notification recipient"),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Inbox {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

/// Read side of notifications, always scoped to the calling user.
#[derive(Clone)]
pub struct NotificationInbox {
    store: MarketStoreHandle,
}

impl NotificationInbox {
    pub fn new(store: MarketStoreHandle) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        actor: &Actor,
        unread_only: bool,
        limit: Option<usize>,
    ) -> Result<Inbox> {
        let notifications = self
            .store
            .notifications(&NotificationFilter {
                recipient_id: Some(actor.user_id),
                unread_only,
                limit: Some(limit.unwrap_or(DEFAULT_INBOX_LIMIT)),
            })
            .await?;
        let unread_count = self.unread_count(actor).await?;
        Ok(Inbox {
            notifications,
            unread_count,
        })
    }

    pub async fn mark_read(&self, actor: &Actor, id: NotificationId) -> Result<Notification> {
        let mut notification = self
            .store
            .notification(id)
            .await?
            .ok_or_else(|| MarketError::not_found("notification", id))?;
        require_ownership(actor, notification.recipient_id, "notification")?;
        if notification.read {
            return Ok(notification);
        }
        notification.read = true;
        self.store
            .commit(ChangeSet::new().put(Record::Notification(notification.clone())))
            .await?;
        Ok(notification)
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_read(&self, actor: &Actor) -> Result<usize> {
        let receipt = self
            .store
            .commit(ChangeSet::new().mark_notifications_read(actor.user_id))
            .await?;
        Ok(receipt.notifications_marked_read)
    }

    pub async fn unread_count(&self, actor: &Actor) -> Result<usize> {
        self.store
            .count_notifications(&NotificationFilter {
                recipient_id: Some(actor.user_id),
                unread_only: true,
                limit: None,
            })
            .await
    }
}
