//! Entry handler for the background polling graph.
//!
//! Checks the mailbox for unread messages and stages them for the email
//! handler. Produces no conversation messages -- a quiet tick must not
//! leave a trace in any transcript.

use chrono::Utc;
use serde_json::{json, Map, Value};

use concierge_core::handler::{Handler, HandlerError};
use concierge_types::agent::AgentName;
use concierge_types::conversation::{ConversationState, Destination, StateUpdate};

use crate::tools::MailboxBackend;

pub struct MailboxPollAgent<M: MailboxBackend> {
    mailbox: M,
}

impl<M: MailboxBackend> MailboxPollAgent<M> {
    pub fn new(mailbox: M) -> Self {
        Self { mailbox }
    }
}

impl<M: MailboxBackend> Handler for MailboxPollAgent<M> {
    fn name(&self) -> AgentName {
        AgentName::MailboxPoll
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StateUpdate, HandlerError> {
        let emails = self.mailbox.fetch_unread(&state.user_id).await?;

        tracing::debug!(
            user_id = %state.user_id,
            unread = emails.len(),
            "mailbox poll tick"
        );

        // The timestamp is recorded on every tick, found mail or not, so a
        // stalled poller is distinguishable from an empty inbox.
        let mut email_updates = Map::new();
        email_updates.insert(
            "unprocessed_emails".to_string(),
            serde_json::to_value(&emails)
                .map_err(|err| HandlerError::Internal(err.to_string()))?,
        );
        email_updates.insert(
            "poll_timestamp".to_string(),
            json!(Utc::now().to_rfc3339()),
        );

        let next = if emails.is_empty() {
            Destination::End
        } else {
            Destination::Agent(AgentName::Email)
        };

        Ok(StateUpdate {
            next_handler: Some(next),
            email_data: email_updates,
            ..Default::default()
        })
    }
}
