//! Travel and reservation search with mandatory human confirmation.
//!
//! A booking conversation moves through phases: gather parameters (asking
//! the user for anything missing), search and present numbered options,
//! then -- only after the human picked one -- execute the booking. The
//! options-pending phase is recorded in `booking_data.ready_for_booking`,
//! so a later turn (or a resume) is interpreted as the selection without
//! another decision call.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use concierge_core::decision::{BoxDecisionProvider, DecisionRequest};
use concierge_core::handler::{Handler, HandlerError};
use concierge_types::agent::{AgentName, ConversationMessage};
use concierge_types::conversation::{ConversationState, Destination, StateUpdate};
use concierge_types::decision::{decision_schema, BookingDecision};

use crate::prompts::BOOKING_PROMPT;
use crate::tools::{BookingBackend, BookingOption};

const TRANSCRIPT_WINDOW: usize = 12;

pub struct BookingAgent<B: BookingBackend> {
    provider: Arc<BoxDecisionProvider>,
    catalog: B,
}

impl<B: BookingBackend> BookingAgent<B> {
    pub fn new(provider: Arc<BoxDecisionProvider>, catalog: B) -> Self {
        Self { provider, catalog }
    }

    /// Options presented on a previous turn, still awaiting a selection.
    fn pending_options(state: &ConversationState) -> Vec<BookingOption> {
        if state.booking_data.get("ready_for_booking") != Some(&json!(true)) {
            return Vec::new();
        }
        state
            .booking_data
            .get("search_results")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Execute the selection the user made against previously presented
    /// options. No decision call happens in this phase.
    async fn confirm_selection(
        &self,
        state: &ConversationState,
        options: &[BookingOption],
    ) -> Result<StateUpdate, HandlerError> {
        let reply = state.last_user_message().unwrap_or("");
        let Some(index) = parse_selection(reply, options.len()) else {
            return Ok(StateUpdate {
                requires_human: Some(true),
                messages: vec![ConversationMessage::assistant(
                    AgentName::Booking,
                    "I didn't catch which option you want. Reply with a number like \"1\", or \"yes\" for the first option.",
                )],
                ..Default::default()
            });
        };

        let confirmation = self.catalog.book(&options[index].id).await?;

        let mut booking_updates = Map::new();
        booking_updates.insert("ready_for_booking".to_string(), json!(false));
        booking_updates.insert(
            "confirmed_booking".to_string(),
            serde_json::to_value(&confirmation)
                .map_err(|err| HandlerError::Internal(err.to_string()))?,
        );

        tracing::info!(
            conversation_id = %state.conversation_id,
            option = %confirmation.option.id,
            reference = %confirmation.reference,
            "booking confirmed"
        );

        Ok(StateUpdate {
            next_handler: Some(Destination::End),
            booking_data: booking_updates,
            messages: vec![ConversationMessage::assistant(
                AgentName::Booking,
                format!(
                    "✓ Booking confirmed: {}. Reference: {}.",
                    confirmation.option.description, confirmation.reference
                ),
            )],
            ..Default::default()
        })
    }

    fn build_input(state: &ConversationState) -> String {
        format!(
            "User ID: {}\nCurrent booking: {}\n\n{}",
            state.user_id,
            Value::Object(state.booking_data.clone()),
            super::render_transcript(state, TRANSCRIPT_WINDOW),
        )
    }
}

impl<B: BookingBackend> Handler for BookingAgent<B> {
    fn name(&self) -> AgentName {
        AgentName::Booking
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StateUpdate, HandlerError> {
        let options = Self::pending_options(state);
        if !options.is_empty() {
            return self.confirm_selection(state, &options).await;
        }

        let request = DecisionRequest::new(
            "BookingDecision",
            decision_schema::<BookingDecision>(),
            BOOKING_PROMPT,
            Self::build_input(state),
        );
        let decision: BookingDecision = self.provider.generate_as(&request).await?;

        let mut booking_updates = Map::new();
        booking_updates.insert(
            "booking_type".to_string(),
            json!(decision.booking_type.to_string()),
        );
        let mut context = Map::new();
        context.insert(
            "booking_type".to_string(),
            json!(decision.booking_type.to_string()),
        );

        if decision.requires_more_info {
            let missing = decision.missing_params.join(", ");
            return Ok(StateUpdate {
                requires_human: Some(true),
                booking_data: booking_updates,
                context,
                messages: vec![ConversationMessage::assistant(
                    AgentName::Booking,
                    format!("I need more information to proceed: {missing}"),
                )],
                ..Default::default()
            });
        }

        if decision.ready_to_search {
            let query = decision.search_query.as_deref().unwrap_or("");
            let found = self.catalog.search(decision.booking_type, query).await?;

            if found.is_empty() {
                return Ok(StateUpdate {
                    next_handler: Some(Destination::End),
                    booking_data: booking_updates,
                    context,
                    messages: vec![ConversationMessage::assistant(
                        AgentName::Booking,
                        format!(
                            "I couldn't find any {} options right now. Please try again later.",
                            decision.booking_type
                        ),
                    )],
                    ..Default::default()
                });
            }

            let mut message = format!(
                "I found {} options for your {}:\n\n",
                found.len(),
                decision.booking_type
            );
            for (i, option) in found.iter().enumerate() {
                if option.price > 0.0 {
                    message.push_str(&format!(
                        "{}. {} - ${:.2}\n",
                        i + 1,
                        option.description,
                        option.price
                    ));
                } else {
                    message.push_str(&format!("{}. {}\n", i + 1, option.description));
                }
            }
            message.push_str("\n⚠️ Please review and confirm your selection.");

            booking_updates.insert(
                "search_results".to_string(),
                serde_json::to_value(&found)
                    .map_err(|err| HandlerError::Internal(err.to_string()))?,
            );
            booking_updates.insert("ready_for_booking".to_string(), json!(true));

            return Ok(StateUpdate {
                requires_human: Some(true),
                booking_data: booking_updates,
                context,
                messages: vec![ConversationMessage::assistant(AgentName::Booking, message)],
                ..Default::default()
            });
        }

        // Parameters are complete but the decision has not settled on a
        // search yet; report progress and take another pass. The human
        // override must stay down here or the self-loop could never run.
        Ok(StateUpdate {
            next_handler: Some(Destination::Agent(AgentName::Booking)),
            booking_data: booking_updates,
            context,
            messages: vec![ConversationMessage::assistant(
                AgentName::Booking,
                format!("Searching for {} options...", decision.booking_type),
            )],
            ..Default::default()
        })
    }
}

/// Interpret a human reply against `option_count` presented options.
///
/// A number picks that option (1-based); a bare affirmation picks the
/// first; anything else is no selection.
fn parse_selection(reply: &str, option_count: usize) -> Option<usize> {
    if let Some(n) = first_number(reply) {
        return (1..=option_count).contains(&n).then(|| n - 1);
    }

    const AFFIRMATIVE: [&str; 7] = [
        "yes", "confirm", "confirmed", "proceed", "ok", "okay", "book",
    ];
    let lowered = reply.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| AFFIRMATIVE.contains(&word))
        .then_some(0)
}

fn first_number(reply: &str) -> Option<usize> {
    let mut digits = String::new();
    for c in reply.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::StaticBookingCatalog;
    use concierge_types::decision::BookingType;
    use concierge_types::error::DecisionError;

    struct Scripted(Value);

    impl concierge_core::decision::DecisionProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: &DecisionRequest) -> Result<Value, DecisionError> {
            Ok(self.0.clone())
        }
    }

    /// Fails the test if the decision provider is consulted at all.
    struct Untouchable;

    impl concierge_core::decision::DecisionProvider for Untouchable {
        fn name(&self) -> &str {
            "untouchable"
        }

        async fn generate(&self, _request: &DecisionRequest) -> Result<Value, DecisionError> {
            Err(DecisionError::Provider {
                message: "decision provider must not be called in the confirmation phase"
                    .to_string(),
            })
        }
    }

    struct EmptyCatalog;

    impl BookingBackend for EmptyCatalog {
        async fn search(
            &self,
            _booking_type: BookingType,
            _query: &str,
        ) -> Result<Vec<BookingOption>, concierge_types::error::BackendError> {
            Ok(Vec::new())
        }

        async fn book(
            &self,
            option_id: &str,
        ) -> Result<crate::tools::BookingConfirmation, concierge_types::error::BackendError> {
            Err(concierge_types::error::BackendError::InvalidPayload(
                format!("unknown booking option: {option_id}"),
            ))
        }
    }

    fn agent(decision: Value) -> BookingAgent<StaticBookingCatalog> {
        BookingAgent::new(
            Arc::new(BoxDecisionProvider::new(Scripted(decision))),
            StaticBookingCatalog::new(),
        )
    }

    fn search_decision(ready: bool) -> Value {
        json!({
            "booking_type": "flight",
            "requires_more_info": false,
            "missing_params": [],
            "ready_to_search": ready,
            "search_query": if ready { json!("nonstop to Lisbon") } else { Value::Null }
        })
    }

    async fn options_pending_state() -> ConversationState {
        let catalog = StaticBookingCatalog::new();
        let options = catalog.search(BookingType::Flight, "").await.unwrap();
        let mut state = ConversationState::new("u1");
        state
            .booking_data
            .insert("ready_for_booking".to_string(), json!(true));
        state.booking_data.insert(
            "search_results".to_string(),
            serde_json::to_value(&options).unwrap(),
        );
        state
    }

    #[tokio::test]
    async fn test_missing_info_asks_and_gates() {
        let handler = agent(json!({
            "booking_type": "hotel",
            "requires_more_info": true,
            "missing_params": ["destination", "dates"],
            "ready_to_search": false,
            "search_query": null
        }));

        let update = handler.invoke(&ConversationState::new("u1")).await.unwrap();

        assert_eq!(update.requires_human, Some(true));
        assert_eq!(
            update.messages[0].content,
            "I need more information to proceed: destination, dates"
        );
        assert_eq!(update.booking_data["booking_type"], json!("hotel"));
        assert_eq!(update.context["booking_type"], json!("hotel"));
    }

    #[tokio::test]
    async fn test_search_presents_numbered_options() {
        let handler = agent(search_decision(true));

        let update = handler.invoke(&ConversationState::new("u1")).await.unwrap();

        let text = &update.messages[0].content;
        assert!(text.starts_with("I found 3 options for your flight:"));
        assert!(text.contains("1. Nonstop departure 08:15, economy - $245.00"));
        assert!(text.ends_with("⚠️ Please review and confirm your selection."));

        assert_eq!(update.requires_human, Some(true));
        assert_eq!(update.booking_data["ready_for_booking"], json!(true));
        assert_eq!(
            update.booking_data["search_results"]
                .as_array()
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn test_search_pending_self_loops_without_gating() {
        let handler = agent(search_decision(false));

        let update = handler.invoke(&ConversationState::new("u1")).await.unwrap();

        assert_eq!(
            update.next_handler,
            Some(Destination::Agent(AgentName::Booking))
        );
        assert!(update.requires_human.is_none());
        assert_eq!(update.messages[0].content, "Searching for flight options...");
    }

    #[tokio::test]
    async fn test_numbered_reply_books_that_option() {
        let handler = BookingAgent::new(
            Arc::new(BoxDecisionProvider::new(Untouchable)),
            StaticBookingCatalog::new(),
        );
        let mut state = options_pending_state().await;
        state
            .messages
            .push(ConversationMessage::user("option 2 please"));

        let update = handler.invoke(&state).await.unwrap();

        assert!(update.messages[0]
            .content
            .starts_with("✓ Booking confirmed: One stop departure 11:40, economy. Reference: BK-"));
        assert_eq!(update.booking_data["ready_for_booking"], json!(false));
        assert_eq!(
            update.booking_data["confirmed_booking"]["option"]["id"],
            json!("flight_002")
        );
        assert_eq!(update.next_handler, Some(Destination::End));
    }

    #[tokio::test]
    async fn test_affirmative_reply_books_first_option() {
        let handler = BookingAgent::new(
            Arc::new(BoxDecisionProvider::new(Untouchable)),
            StaticBookingCatalog::new(),
        );
        let mut state = options_pending_state().await;
        state.messages.push(ConversationMessage::user("yes, go ahead"));

        let update = handler.invoke(&state).await.unwrap();
        assert_eq!(
            update.booking_data["confirmed_booking"]["option"]["id"],
            json!("flight_001")
        );
    }

    #[tokio::test]
    async fn test_unclear_reply_asks_again() {
        let handler = BookingAgent::new(
            Arc::new(BoxDecisionProvider::new(Untouchable)),
            StaticBookingCatalog::new(),
        );
        let mut state = options_pending_state().await;
        state.messages.push(ConversationMessage::user("hmm maybe"));

        let update = handler.invoke(&state).await.unwrap();

        assert_eq!(update.requires_human, Some(true));
        assert!(update.messages[0].content.contains("didn't catch"));
        assert!(!update.booking_data.contains_key("confirmed_booking"));
    }

    #[tokio::test]
    async fn test_empty_results_apologize_and_end() {
        let handler = BookingAgent::new(
            Arc::new(BoxDecisionProvider::new(Scripted(search_decision(true)))),
            EmptyCatalog,
        );

        let update = handler.invoke(&ConversationState::new("u1")).await.unwrap();

        assert_eq!(update.next_handler, Some(Destination::End));
        assert!(update.requires_human.is_none());
        assert!(update.messages[0].content.contains("couldn't find any flight options"));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("2", 3), Some(1));
        assert_eq!(parse_selection("option 3 please", 3), Some(2));
        assert_eq!(parse_selection("5", 3), None);
        assert_eq!(parse_selection("yes", 3), Some(0));
        assert_eq!(parse_selection("Book it!", 3), Some(0));
        assert_eq!(parse_selection("hmm not sure", 3), None);
        assert_eq!(parse_selection("neither of these", 3), None);
        assert_eq!(parse_selection("", 3), None);
    }
}
