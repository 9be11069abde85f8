//! Emotional-state annotation over the interaction history.
//!
//! The wellbeing handler never steers the conversation: it replaces the
//! emotion snapshot and stress level, notes its findings in context, and
//! speaks only when the alert level is elevated and a break is warranted.
//! Its graph route is a fixed edge back to the supervisor.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map};

use concierge_core::decision::{BoxDecisionProvider, DecisionRequest};
use concierge_core::handler::{Handler, HandlerError};
use concierge_types::agent::{AgentName, ConversationMessage};
use concierge_types::conversation::{ConversationState, StateUpdate};
use concierge_types::decision::{decision_schema, WellbeingDecision};
use concierge_types::emotion::EmotionSnapshot;

use crate::prompts::WELLBEING_PROMPT;

const TRANSCRIPT_WINDOW: usize = 12;

/// How many interaction-history records feed the assessment.
const HISTORY_WINDOW: usize = 10;

pub struct WellbeingAgent {
    provider: Arc<BoxDecisionProvider>,
}

impl WellbeingAgent {
    pub fn new(provider: Arc<BoxDecisionProvider>) -> Self {
        Self { provider }
    }

    fn build_input(state: &ConversationState) -> String {
        let start = state.interaction_history.len().saturating_sub(HISTORY_WINDOW);
        let history = state.interaction_history[start..]
            .iter()
            .map(|record| format!("[{}] {}: {}", record.at.to_rfc3339(), record.agent, record.summary))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Interaction history:\n{history}\n\n{}",
            super::render_transcript(state, TRANSCRIPT_WINDOW)
        )
    }
}

impl Handler for WellbeingAgent {
    fn name(&self) -> AgentName {
        AgentName::Wellbeing
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StateUpdate, HandlerError> {
        let request = DecisionRequest::new(
            "WellbeingDecision",
            decision_schema::<WellbeingDecision>(),
            WELLBEING_PROMPT,
            Self::build_input(state),
        );
        let decision: WellbeingDecision = self.provider.generate_as(&request).await?;

        let snapshot = EmotionSnapshot {
            sentiment_score: decision.sentiment_score,
            emotion: decision.emotion_detected.clone(),
            stress_level: decision.stress_level,
            alert_level: decision.alert_level,
            recommendations: decision.recommendations.clone(),
            recorded_at: Utc::now(),
        };

        let mut messages = Vec::new();
        if decision.alert_level.is_elevated() && decision.should_suggest_break {
            let suggestion = decision
                .recommendations
                .first()
                .map(String::as_str)
                .unwrap_or("Consider taking a break.");
            messages.push(ConversationMessage::assistant(
                AgentName::Wellbeing,
                format!("💙 {suggestion}"),
            ));
        }

        let mut context = Map::new();
        context.insert(
            "health_alert".to_string(),
            json!(decision.alert_level.to_string()),
        );
        context.insert(
            "sentiment_trend".to_string(),
            json!(decision.trending_sentiment),
        );

        tracing::debug!(
            conversation_id = %state.conversation_id,
            stress = decision.stress_level,
            alert = %decision.alert_level,
            trend = %decision.trending_sentiment,
            "wellbeing assessed"
        );

        Ok(StateUpdate {
            stress_level: Some(decision.stress_level),
            emotion_state: Some(snapshot),
            context,
            messages,
            ..Default::default()
        })
    }
}
