//! Intent classification and routing.
//!
//! The supervisor reads the transcript, asks the decision provider which
//! specialist should take over, and writes only `next_handler` (plus a
//! feedback clear when it consumed one). It never speaks to the user and
//! never raises the human override.

use std::sync::Arc;

use concierge_core::decision::{BoxDecisionProvider, DecisionRequest};
use concierge_core::handler::{Handler, HandlerError};
use concierge_types::agent::AgentName;
use concierge_types::conversation::{ConversationState, StateUpdate};
use concierge_types::decision::{decision_schema, SupervisorDecision, SupervisorRoute};

use crate::prompts::SUPERVISOR_PROMPT;

/// How many trailing messages the classifier sees.
const TRANSCRIPT_WINDOW: usize = 12;

pub struct SupervisorAgent {
    provider: Arc<BoxDecisionProvider>,
}

impl SupervisorAgent {
    pub fn new(provider: Arc<BoxDecisionProvider>) -> Self {
        Self { provider }
    }
}

impl Handler for SupervisorAgent {
    fn name(&self) -> AgentName {
        AgentName::Supervisor
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StateUpdate, HandlerError> {
        let mut input = super::render_transcript(state, TRANSCRIPT_WINDOW);

        // Resumed conversations carry the human's answer both as a message
        // and as stored feedback; fold the feedback in explicitly and
        // consume it so downstream handlers see it exactly once.
        let had_feedback = state.human_feedback.is_some();
        if let Some(feedback) = &state.human_feedback {
            input.push_str("\n\nThe user just answered a confirmation request with: ");
            input.push_str(feedback);
        }

        let request = DecisionRequest::new(
            "SupervisorDecision",
            decision_schema::<SupervisorDecision>(),
            SUPERVISOR_PROMPT,
            input,
        );
        let decision: SupervisorDecision = self.provider.generate_as(&request).await?;

        let mut route = decision.next_agent;
        // The wellbeing handler always hands control back here; routing to
        // it again would bounce forever without a user-visible reply.
        if state.current_handler == Some(AgentName::Wellbeing)
            && route == SupervisorRoute::Wellbeing
        {
            route = SupervisorRoute::Chitchat;
        }

        let destination = route.destination();
        tracing::debug!(
            conversation_id = %state.conversation_id,
            destination = %destination,
            reasoning = %decision.reasoning,
            "supervisor routed"
        );

        Ok(StateUpdate {
            next_handler: Some(destination),
            clear_feedback: had_feedback,
            ..Default::default()
        })
    }
}
