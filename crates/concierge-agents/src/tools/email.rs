//! Mailbox access for the email and mailbox-poll handlers.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use concierge_types::error::BackendError;

/// One message in a user's inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A message about to leave the assistant on the user's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailbox operations the handlers depend on.
pub trait MailboxBackend: Send + Sync {
    /// Unread messages for a user, oldest first.
    fn fetch_unread(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Email>, BackendError>> + Send;

    fn send(
        &self,
        outgoing: &OutgoingEmail,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn mark_read(
        &self,
        user_id: &str,
        email_id: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl<M: MailboxBackend> MailboxBackend for Arc<M> {
    fn fetch_unread(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Email>, BackendError>> + Send {
        (**self).fetch_unread(user_id)
    }

    fn send(
        &self,
        outgoing: &OutgoingEmail,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).send(outgoing)
    }

    fn mark_read(
        &self,
        user_id: &str,
        email_id: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).mark_read(user_id, email_id)
    }
}

/// Mailbox held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryMailbox {
    inboxes: DashMap<String, Vec<Email>>,
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailbox pre-loaded with one unread meeting request, the shape a
    /// polling tick typically finds.
    pub fn with_sample_inbox(user_id: &str) -> Self {
        let mailbox = Self::new();
        mailbox.deliver(
            user_id,
            Email {
                id: "email_001".to_string(),
                from: "john@example.com".to_string(),
                to: "user@example.com".to_string(),
                subject: "Meeting Request".to_string(),
                body: "Can we schedule a call for next Tuesday at 2pm?".to_string(),
                received_at: Utc::now(),
                is_read: false,
            },
        );
        mailbox
    }

    /// Drop a message into a user's inbox.
    pub fn deliver(&self, user_id: &str, email: Email) {
        self.inboxes.entry(user_id.to_string()).or_default().push(email);
    }

    /// Everything sent through this mailbox so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().expect("sent-mail lock poisoned").clone()
    }
}

impl MailboxBackend for InMemoryMailbox {
    async fn fetch_unread(&self, user_id: &str) -> Result<Vec<Email>, BackendError> {
        Ok(self
            .inboxes
            .get(user_id)
            .map(|inbox| inbox.iter().filter(|e| !e.is_read).cloned().collect())
            .unwrap_or_default())
    }

    async fn send(&self, outgoing: &OutgoingEmail) -> Result<(), BackendError> {
        if outgoing.to.is_empty() {
            return Err(BackendError::InvalidPayload(
                "outgoing email has no recipient".to_string(),
            ));
        }
        self.sent
            .lock()
            .expect("sent-mail lock poisoned")
            .push(outgoing.clone());
        Ok(())
    }

    async fn mark_read(&self, user_id: &str, email_id: &str) -> Result<(), BackendError> {
        if let Some(mut inbox) = self.inboxes.get_mut(user_id) {
            for email in inbox.iter_mut() {
                if email.id == email_id {
                    email.is_read = true;
                }
            }
        }
        Ok(())
    }
}
