//! The two graph topologies this crate ships.
//!
//! `interactive_graph` serves a live conversation: the supervisor fans
//! out to the specialists and the human gate handles confirmations.
//! `polling_graph` is the unattended variant driven by the background
//! scheduler -- a short mailbox-to-calendar pipeline with no supervisor
//! and, deliberately, no gate: nothing in an unattended run may block
//! waiting for a person.

use std::sync::Arc;

use concierge_core::decision::BoxDecisionProvider;
use concierge_core::graph::definition::{ConfigurationError, GraphDefinition};
use concierge_core::graph::routing::Route;
use concierge_types::agent::AgentName;
use concierge_types::conversation::Destination;

use crate::handlers::{
    BookingAgent, ChitchatAgent, EmailAgent, HumanGate, MailboxPollAgent, SchedulerAgent,
    SupervisorAgent, WellbeingAgent,
};
use crate::tools::{BookingBackend, CalendarBackend, MailboxBackend};

/// Step allowance for a single engine run. Generous for the interactive
/// graph's worst case (supervisor round trips through several
/// specialists) while still catching a routing cycle quickly.
pub const DEFAULT_MAX_STEPS: u32 = 25;

/// The full conversational graph, entered at the supervisor.
pub fn interactive_graph<M, C, B>(
    provider: Arc<BoxDecisionProvider>,
    mailbox: M,
    calendar: C,
    catalog: B,
    max_steps: u32,
) -> Result<GraphDefinition, ConfigurationError>
where
    M: MailboxBackend + 'static,
    C: CalendarBackend + 'static,
    B: BookingBackend + 'static,
{
    GraphDefinition::builder("interactive", max_steps)
        .entry(AgentName::Supervisor)
        .register(
            SupervisorAgent::new(provider.clone()),
            Route::conditional(
                [
                    Destination::Agent(AgentName::Email),
                    Destination::Agent(AgentName::Scheduler),
                    Destination::Agent(AgentName::Booking),
                    Destination::Agent(AgentName::Chitchat),
                    Destination::Agent(AgentName::Wellbeing),
                    Destination::End,
                ],
                |state| {
                    state
                        .next_handler
                        .unwrap_or(Destination::Agent(AgentName::Chitchat))
                },
            ),
        )
        .register(
            EmailAgent::new(provider.clone(), mailbox),
            Route::conditional(
                [
                    Destination::Agent(AgentName::Scheduler),
                    Destination::Agent(AgentName::Supervisor),
                    Destination::End,
                ],
                |state| {
                    // A freshly enqueued calendar request outranks any other
                    // handoff: it must reach the scheduler before the run ends.
                    if state.has_schedule_actions() {
                        Destination::Agent(AgentName::Scheduler)
                    } else {
                        state
                            .next_handler
                            .unwrap_or(Destination::Agent(AgentName::Supervisor))
                    }
                },
            ),
        )
        .register(
            SchedulerAgent::new(provider.clone(), calendar),
            Route::conditional(
                [Destination::Agent(AgentName::Supervisor), Destination::End],
                |state| {
                    state
                        .next_handler
                        .unwrap_or(Destination::Agent(AgentName::Supervisor))
                },
            ),
        )
        .register(
            BookingAgent::new(provider.clone(), catalog),
            Route::conditional(
                [Destination::Agent(AgentName::Booking), Destination::End],
                |state| state.next_handler.unwrap_or(Destination::End),
            ),
        )
        .register(
            ChitchatAgent::new(provider.clone()),
            Route::conditional(
                [
                    Destination::Agent(AgentName::Email),
                    Destination::Agent(AgentName::Scheduler),
                    Destination::Agent(AgentName::Booking),
                    Destination::End,
                ],
                |state| state.next_handler.unwrap_or(Destination::End),
            ),
        )
        .register(
            WellbeingAgent::new(provider),
            // Always back to the supervisor: wellbeing annotates, it never
            // decides where the conversation goes.
            Route::fixed(AgentName::Supervisor),
        )
        .register(
            HumanGate::new(),
            Route::conditional(
                [Destination::Agent(AgentName::Supervisor), Destination::End],
                |state| state.next_handler.unwrap_or(Destination::End),
            ),
        )
        .build()
}

/// The unattended mailbox pipeline: poll, triage, schedule, stop.
pub fn polling_graph<M, C>(
    provider: Arc<BoxDecisionProvider>,
    mailbox: M,
    calendar: C,
    max_steps: u32,
) -> Result<GraphDefinition, ConfigurationError>
where
    M: MailboxBackend + Clone + 'static,
    C: CalendarBackend + 'static,
{
    GraphDefinition::builder("mailbox-polling", max_steps)
        .entry(AgentName::MailboxPoll)
        .register(
            MailboxPollAgent::new(mailbox.clone()),
            Route::conditional(
                [Destination::Agent(AgentName::Email), Destination::End],
                |state| state.next_handler.unwrap_or(Destination::End),
            ),
        )
        .register(
            EmailAgent::new(provider.clone(), mailbox),
            Route::conditional(
                [Destination::Agent(AgentName::Scheduler), Destination::End],
                |state| {
                    if state.has_schedule_actions() {
                        Destination::Agent(AgentName::Scheduler)
                    } else {
                        Destination::End
                    }
                },
            ),
        )
        .register(
            SchedulerAgent::new(provider, calendar),
            Route::fixed(Destination::End),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use concierge_core::bus::EventBus;
    use concierge_core::decision::{DecisionProvider, DecisionRequest};
    use concierge_core::engine::Engine;
    use concierge_types::agent::ConversationMessage;
    use concierge_types::conversation::{ConversationState, PendingAction};
    use concierge_types::error::DecisionError;
    use concierge_types::event::EngineEvent;

    use crate::tools::{InMemoryCalendar, InMemoryMailbox, StaticBookingCatalog};

    /// Provider for topology tests; building a graph must never call it.
    struct Inert;

    impl DecisionProvider for Inert {
        fn name(&self) -> &str {
            "inert"
        }

        async fn generate(
            &self,
            _request: &DecisionRequest,
        ) -> Result<serde_json::Value, DecisionError> {
            Err(DecisionError::EmptyResponse)
        }
    }

    fn provider() -> Arc<BoxDecisionProvider> {
        Arc::new(BoxDecisionProvider::new(Inert))
    }

    fn interactive() -> GraphDefinition {
        interactive_graph(
            provider(),
            InMemoryMailbox::new(),
            InMemoryCalendar::new(),
            StaticBookingCatalog,
            DEFAULT_MAX_STEPS,
        )
        .expect("interactive graph should validate")
    }

    fn polling() -> GraphDefinition {
        polling_graph(
            provider(),
            Arc::new(InMemoryMailbox::new()),
            InMemoryCalendar::new(),
            DEFAULT_MAX_STEPS,
        )
        .expect("polling graph should validate")
    }

    #[test]
    fn test_interactive_graph_enters_at_supervisor() {
        let graph = interactive();
        assert_eq!(graph.entry(), AgentName::Supervisor);
        for name in [
            AgentName::Supervisor,
            AgentName::Email,
            AgentName::Scheduler,
            AgentName::Booking,
            AgentName::Chitchat,
            AgentName::Wellbeing,
            AgentName::HumanGate,
        ] {
            assert!(graph.has_handler(name), "missing handler {name}");
        }
        assert!(!graph.has_handler(AgentName::MailboxPoll));
    }

    #[test]
    fn test_supervisor_route_defaults_to_chitchat() {
        let graph = interactive();
        let state = ConversationState::new("u1");
        assert_eq!(
            graph.route(AgentName::Supervisor).evaluate(&state),
            Destination::Agent(AgentName::Chitchat)
        );
    }

    #[test]
    fn test_email_route_prefers_pending_schedule_work() {
        let graph = interactive();
        let mut state = ConversationState::new("u1");
        assert_eq!(
            graph.route(AgentName::Email).evaluate(&state),
            Destination::Agent(AgentName::Supervisor)
        );

        state
            .pending_actions
            .push(PendingAction::schedule(json!({}), AgentName::Email));
        assert_eq!(
            graph.route(AgentName::Email).evaluate(&state),
            Destination::Agent(AgentName::Scheduler)
        );
    }

    #[test]
    fn test_polling_graph_never_touches_the_gate() {
        let graph = polling();
        assert_eq!(graph.entry(), AgentName::MailboxPoll);
        assert!(!graph.has_handler(AgentName::HumanGate));
        assert!(!graph.any_route_declares(Destination::Agent(AgentName::HumanGate)));
    }

    #[test]
    fn test_polling_email_route_ends_without_schedule_work() {
        let graph = polling();
        let mut state = ConversationState::new("u1");
        assert_eq!(
            graph.route(AgentName::Email).evaluate(&state),
            Destination::End
        );

        state
            .pending_actions
            .push(PendingAction::schedule(json!({}), AgentName::Email));
        assert_eq!(
            graph.route(AgentName::Email).evaluate(&state),
            Destination::Agent(AgentName::Scheduler)
        );
    }

    /// Answers by requested schema so one provider can serve a whole
    /// scripted engine run.
    struct ScriptedRun;

    impl DecisionProvider for ScriptedRun {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            request: &DecisionRequest,
        ) -> Result<serde_json::Value, DecisionError> {
            match request.schema_name.as_str() {
                "SupervisorDecision" => Ok(json!({
                    "next_agent": "scheduler",
                    "reasoning": "calendar request"
                })),
                "SchedulerDecision" => Ok(json!({
                    "action": "create_event",
                    "event": {
                        "title": "Budget review",
                        "start_time": "2025-01-15T10:30:00Z",
                        "end_time": null,
                        "attendees": [],
                        "location": null,
                        "description": null
                    },
                    "todo": null,
                    "reminder_time": null,
                    "suggestions": ["Thursday 09:00"],
                    "requires_confirmation": false
                })),
                other => Err(DecisionError::InvalidRequest(other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_conflict_suspends_run_at_the_gate() {
        use chrono::TimeZone;

        // Calendar already holds 10:00-11:00; the scripted request wants
        // 10:30, so the scheduler must refuse and raise the override.
        let ten_am = chrono::Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        let graph = interactive_graph(
            Arc::new(BoxDecisionProvider::new(ScriptedRun)),
            InMemoryMailbox::new(),
            InMemoryCalendar::with_sample_events("u1", ten_am),
            StaticBookingCatalog,
            DEFAULT_MAX_STEPS,
        )
        .unwrap();

        let engine = Engine::new(EventBus::new(16));
        let mut events = engine.bus().subscribe();

        let mut state = ConversationState::new("u1");
        state.messages.push(ConversationMessage::user(
            "schedule a budget review tomorrow at 10:30",
        ));

        let result = engine.run(&graph, state).await.unwrap();

        // The scheduler's own route points at the supervisor; the raised
        // override carries the run to the gate instead.
        assert!(result.is_suspended());
        assert!(result.requires_human);
        assert_eq!(result.current_handler, Some(AgentName::HumanGate));

        let warning = result
            .messages
            .iter()
            .find(|m| m.content.contains("Scheduling conflict"))
            .expect("conflict warning in the transcript");
        assert_eq!(warning.agent, Some(AgentName::Scheduler));
        assert_eq!(
            result.messages.last().unwrap().agent,
            Some(AgentName::HumanGate)
        );

        let mut suspended = false;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::RunSuspended { suspended_by, .. } = event {
                assert_eq!(suspended_by, AgentName::HumanGate);
                suspended = true;
            }
        }
        assert!(suspended, "run should have published RunSuspended");
    }
}
