//! The suspend/resume boundary for human approval.
//!
//! With feedback waiting, the gate consumes it, lowers the human override,
//! and hands the conversation back to the supervisor. Without feedback it
//! posts a waiting notice and routes to the terminal -- the run ends but
//! the conversation is suspended, not finished.

use concierge_core::handler::{Handler, HandlerError};
use concierge_types::agent::{AgentName, ConversationMessage};
use concierge_types::conversation::{ConversationState, Destination, StateUpdate};

/// Message shown while a conversation waits at the gate.
pub const WAITING_MESSAGE: &str = "⏸️ Waiting for your confirmation...";

#[derive(Debug, Default)]
pub struct HumanGate;

impl HumanGate {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for HumanGate {
    fn name(&self) -> AgentName {
        AgentName::HumanGate
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StateUpdate, HandlerError> {
        if state.human_feedback.is_some() {
            tracing::debug!(
                conversation_id = %state.conversation_id,
                "feedback received, reopening conversation"
            );
            return Ok(StateUpdate {
                next_handler: Some(Destination::Agent(AgentName::Supervisor)),
                requires_human: Some(false),
                clear_feedback: true,
                ..Default::default()
            });
        }

        tracing::debug!(
            conversation_id = %state.conversation_id,
            "suspending for human input"
        );
        Ok(StateUpdate {
            next_handler: Some(Destination::End),
            messages: vec![ConversationMessage::system(
                AgentName::HumanGate,
                WAITING_MESSAGE,
            )],
            ..Default::default()
        })
    }
}
