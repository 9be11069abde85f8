//! Mailbox triage, reply drafting, and schedule extraction.
//!
//! Serves two callers: interactive requests routed by the supervisor, and
//! polling runs where the mailbox-poll handler has stashed a batch under
//! `email_data.unprocessed_emails`. Either way the decision provider
//! classifies the work, drafts any reply, and flags meeting requests for
//! the scheduler via a pending action.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use concierge_core::decision::{BoxDecisionProvider, DecisionRequest};
use concierge_core::handler::{Handler, HandlerError};
use concierge_types::agent::{AgentName, ConversationMessage};
use concierge_types::conversation::{ConversationState, PendingAction, StateUpdate};
use concierge_types::decision::{decision_schema, EmailAction, EmailDecision};

use crate::prompts::EMAIL_PROMPT;
use crate::tools::{Email, MailboxBackend, OutgoingEmail};

const TRANSCRIPT_WINDOW: usize = 12;

pub struct EmailAgent<M: MailboxBackend> {
    provider: Arc<BoxDecisionProvider>,
    mailbox: M,
}

impl<M: MailboxBackend> EmailAgent<M> {
    pub fn new(provider: Arc<BoxDecisionProvider>, mailbox: M) -> Self {
        Self { provider, mailbox }
    }

    /// The batch stashed by the mailbox-poll handler, if any.
    fn unprocessed(state: &ConversationState) -> Vec<Email> {
        state
            .email_data
            .get("unprocessed_emails")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    fn build_input(state: &ConversationState, unprocessed: &[Email]) -> String {
        let mut input = format!(
            "User ID: {}\nCurrent time: {}\n\n{}",
            state.user_id,
            chrono::Utc::now().to_rfc3339(),
            super::render_transcript(state, TRANSCRIPT_WINDOW),
        );
        if !unprocessed.is_empty() {
            input.push_str("\n\nUnprocessed emails:\n");
            for email in unprocessed {
                input.push_str(&format!(
                    "- from {} subject \"{}\": {}\n",
                    email.from, email.subject, email.body
                ));
            }
        }
        input
    }
}

impl<M: MailboxBackend> Handler for EmailAgent<M> {
    fn name(&self) -> AgentName {
        AgentName::Email
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StateUpdate, HandlerError> {
        let unprocessed = Self::unprocessed(state);

        let request = DecisionRequest::new(
            "EmailDecision",
            decision_schema::<EmailDecision>(),
            EMAIL_PROMPT,
            Self::build_input(state, &unprocessed),
        );
        let decision: EmailDecision = self.provider.generate_as(&request).await?;

        let mut email_updates = Map::new();
        let mut pending_actions = Vec::new();

        match (decision.action, &decision.draft_reply) {
            (EmailAction::Reply, Some(draft)) => {
                // Accumulate into the existing list; shallow-merge replaces
                // whole keys, so the read-modify-write happens here.
                let mut drafts: Vec<Value> = state
                    .email_data
                    .get("drafted_replies")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                drafts.push(json!(draft));
                email_updates.insert("drafted_replies".to_string(), Value::Array(drafts));
            }
            (EmailAction::SendNew, Some(draft)) => {
                // Outbound mail needs an address; without one the draft is
                // kept so nothing the model wrote is lost.
                let recipient = state
                    .context
                    .get("recipient")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match recipient {
                    Some(to) => {
                        let subject = state
                            .context
                            .get("subject")
                            .and_then(Value::as_str)
                            .unwrap_or("(no subject)")
                            .to_string();
                        self.mailbox
                            .send(&OutgoingEmail {
                                to,
                                subject,
                                body: draft.clone(),
                            })
                            .await?;
                        email_updates.insert("emails_sent".to_string(), json!(true));
                    }
                    None => {
                        let mut drafts: Vec<Value> = state
                            .email_data
                            .get("drafted_replies")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default();
                        drafts.push(json!(draft));
                        email_updates.insert("drafted_replies".to_string(), Value::Array(drafts));
                    }
                }
            }
            _ => {}
        }

        if decision.requires_scheduling {
            if let Some(event) = &decision.calendar_event {
                let payload = serde_json::to_value(event)
                    .map_err(|err| HandlerError::Internal(err.to_string()))?;
                pending_actions.push(PendingAction::schedule(payload, AgentName::Email));
            }
        }

        // The batch is consumed exactly once: mark each message read and
        // clear the stash so the next poll starts fresh.
        if !unprocessed.is_empty() {
            for email in &unprocessed {
                self.mailbox.mark_read(&state.user_id, &email.id).await?;
            }
            email_updates.insert("unprocessed_emails".to_string(), json!([]));
        }

        let mut context = Map::new();
        context.insert(
            "last_email_action".to_string(),
            json!(decision.action.to_string()),
        );
        context.insert(
            "email_priority".to_string(),
            json!(decision.priority.to_string()),
        );

        let summary = format!(
            "Email processed. Action: {}. {}",
            decision.action,
            decision.draft_reply.as_deref().unwrap_or("")
        );

        tracing::debug!(
            conversation_id = %state.conversation_id,
            action = %decision.action,
            priority = %decision.priority,
            batch = unprocessed.len(),
            schedules = pending_actions.len(),
            "email handled"
        );

        Ok(StateUpdate {
            // The schedule handoff is decided by the routing rule from the
            // pending action; everything else returns to the supervisor.
            next_handler: None,
            email_data: email_updates,
            context,
            messages: vec![ConversationMessage::assistant(AgentName::Email, summary)],
            pending_actions,
            ..Default::default()
        })
    }
}
