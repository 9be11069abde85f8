//! Casual conversation and escalation detection.

use std::sync::Arc;

use serde_json::{json, Map};

use concierge_core::decision::{BoxDecisionProvider, DecisionRequest};
use concierge_core::handler::{Handler, HandlerError};
use concierge_types::agent::{AgentName, ConversationMessage};
use concierge_types::conversation::{ConversationState, StateUpdate};
use concierge_types::decision::{decision_schema, ChitchatDecision};

use crate::prompts::CHITCHAT_PROMPT;

const TRANSCRIPT_WINDOW: usize = 12;

pub struct ChitchatAgent {
    provider: Arc<BoxDecisionProvider>,
}

impl ChitchatAgent {
    pub fn new(provider: Arc<BoxDecisionProvider>) -> Self {
        Self { provider }
    }
}

impl Handler for ChitchatAgent {
    fn name(&self) -> AgentName {
        AgentName::Chitchat
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StateUpdate, HandlerError> {
        let request = DecisionRequest::new(
            "ChitchatDecision",
            decision_schema::<ChitchatDecision>(),
            CHITCHAT_PROMPT,
            super::render_transcript(state, TRANSCRIPT_WINDOW),
        );
        let decision: ChitchatDecision = self.provider.generate_as(&request).await?;

        let escalation = if decision.requires_escalation {
            decision.escalate_to
        } else {
            None
        };

        let mut context = Map::new();
        context.insert(
            "detected_intent".to_string(),
            json!(decision.detected_intent),
        );
        context.insert("escalated".to_string(), json!(escalation.is_some()));

        tracing::debug!(
            conversation_id = %state.conversation_id,
            intent = %decision.detected_intent,
            escalated = escalation.is_some(),
            "chitchat handled"
        );

        Ok(StateUpdate {
            next_handler: escalation.map(|target| target.destination()),
            context,
            messages: vec![ConversationMessage::assistant(
                AgentName::Chitchat,
                decision.response_text,
            )],
            ..Default::default()
        })
    }
}
