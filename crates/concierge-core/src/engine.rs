//! The step-execution loop.
//!
//! One `run` drives one conversation through a graph until it reaches
//! the terminal marker, suspends at the human gate, or trips a guard.
//! Within a run, steps are strictly sequential: each step's input is the
//! previous step's output, so no locking is needed here. Concurrency
//! exists only across runs, which never share a state value.
//!
//! Per step the engine:
//! 1. fails with `StepLimitExceeded` once `max_steps` invocations have run;
//! 2. clears `next_handler` -- it is a per-step output channel, written
//!    by the handler's update and read by the routing functions, never
//!    carried across steps;
//! 3. invokes the current handler; a handler error is recovered into a
//!    degraded terminal state, never propagated;
//! 4. merges the update and appends the engine-authored
//!    `interaction_history` record;
//! 5. selects the destination: human-override first, then the handler's
//!    route; an undeclared destination is a `RoutingViolation`.

use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use concierge_types::agent::{AgentName, ConversationMessage};
use concierge_types::conversation::{
    ConversationState, Destination, InteractionRecord, StateUpdate,
};
use concierge_types::event::EngineEvent;

use crate::bus::EventBus;
use crate::graph::definition::GraphDefinition;

/// Fatal run-time failures. Handler failures are not here: those are
/// recovered into a degraded terminal state inside the loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("routing violation: handler '{from}' chose undeclared destination '{to}'")]
    RoutingViolation { from: AgentName, to: Destination },

    #[error("step limit of {max_steps} exceeded; conversation is stuck in a cycle")]
    StepLimitExceeded { max_steps: u32 },
}

const RECOVERY_MESSAGE: &str =
    "I ran into a problem while handling that. Nothing was lost; please try again \
     or rephrase your request.";

const SUMMARY_MAX_CHARS: usize = 120;

/// Drives conversations through validated graph definitions.
///
/// Stateless apart from the event bus; one instance serves all
/// conversations concurrently.
#[derive(Debug, Clone)]
pub struct Engine {
    bus: EventBus,
}

impl Engine {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run a conversation from the graph's entry until terminal,
    /// suspension, or a guard failure.
    pub async fn run(
        &self,
        def: &GraphDefinition,
        mut state: ConversationState,
    ) -> Result<ConversationState, EngineError> {
        let started = Instant::now();
        self.bus.publish(EngineEvent::RunStarted {
            conversation_id: state.conversation_id,
            user_id: state.user_id.clone(),
            entry: def.entry(),
        });
        info!(
            conversation = %state.conversation_id,
            graph = def.name(),
            entry = %def.entry(),
            "engine run started"
        );

        let mut current = def.entry();
        let mut steps: u32 = 0;

        loop {
            if steps >= def.max_steps() {
                let err = EngineError::StepLimitExceeded {
                    max_steps: def.max_steps(),
                };
                warn!(conversation = %state.conversation_id, %err, "engine run failed");
                self.bus.publish(EngineEvent::RunFailed {
                    conversation_id: state.conversation_id,
                    error: err.to_string(),
                });
                return Err(err);
            }
            steps += 1;

            state.next_handler = None;
            debug!(
                conversation = %state.conversation_id,
                step = steps,
                agent = %current,
                "invoking handler"
            );

            let update = match def.handler(current).invoke(&state).await {
                Ok(update) => update,
                Err(err) => {
                    warn!(
                        conversation = %state.conversation_id,
                        agent = %current,
                        error = %err,
                        "handler failed; recovering into degraded terminal state"
                    );
                    self.bus.publish(EngineEvent::HandlerRecovered {
                        conversation_id: state.conversation_id,
                        agent: current,
                        error: err.to_string(),
                    });
                    self.merge(&mut state, current, recovery_update(current));
                    self.bus.publish(EngineEvent::RunCompleted {
                        conversation_id: state.conversation_id,
                        steps,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                    return Ok(state);
                }
            };

            if update.requires_human == Some(true) && update.messages.is_empty() {
                warn!(
                    agent = %current,
                    "handler raised requires_human without an explanatory message"
                );
            }
            self.merge(&mut state, current, update);

            let destination = self.select_destination(def, current, &state)?;
            self.bus.publish(EngineEvent::StepCompleted {
                conversation_id: state.conversation_id,
                step: steps,
                agent: current,
                destination,
            });

            match destination {
                Destination::End => {
                    if !state.is_suspended() && state.has_schedule_actions() {
                        warn!(
                            conversation = %state.conversation_id,
                            pending = state.pending_actions.len(),
                            "terminal state still holds unconsumed schedule actions"
                        );
                    }
                    if state.is_suspended() {
                        info!(
                            conversation = %state.conversation_id,
                            suspended_by = %current,
                            "engine run suspended awaiting human input"
                        );
                        self.bus.publish(EngineEvent::RunSuspended {
                            conversation_id: state.conversation_id,
                            suspended_by: current,
                        });
                    } else {
                        info!(
                            conversation = %state.conversation_id,
                            steps,
                            "engine run completed"
                        );
                        self.bus.publish(EngineEvent::RunCompleted {
                            conversation_id: state.conversation_id,
                            steps,
                            duration_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    return Ok(state);
                }
                Destination::Agent(next) => current = next,
            }
        }
    }

    /// Merge a handler's update plus the engine-authored fields.
    fn merge(&self, state: &mut ConversationState, agent: AgentName, update: StateUpdate) {
        let summary = step_summary(&update);
        state.current_handler = Some(agent);
        state.apply(update);
        state.interaction_history.push(InteractionRecord {
            agent,
            summary,
            at: Utc::now(),
        });
    }

    /// Destination precedence: human-override, then fixed edge, then the
    /// routing function checked against the declared set.
    ///
    /// The override is skipped when the gate itself just ran (it would
    /// otherwise re-enter forever) and in graphs that do not register a
    /// gate at all, where the flag merely persists into the stored state.
    fn select_destination(
        &self,
        def: &GraphDefinition,
        current: AgentName,
        state: &ConversationState,
    ) -> Result<Destination, EngineError> {
        if state.requires_human
            && current != AgentName::HumanGate
            && def.has_handler(AgentName::HumanGate)
        {
            return Ok(Destination::Agent(AgentName::HumanGate));
        }

        let route = def.route(current);
        let destination = route.evaluate(state);
        if !route.declares(destination) {
            let err = EngineError::RoutingViolation {
                from: current,
                to: destination,
            };
            warn!(conversation = %state.conversation_id, %err, "engine run failed");
            self.bus.publish(EngineEvent::RunFailed {
                conversation_id: state.conversation_id,
                error: err.to_string(),
            });
            return Err(err);
        }
        Ok(destination)
    }
}

fn recovery_update(agent: AgentName) -> StateUpdate {
    StateUpdate {
        requires_human: Some(false),
        messages: vec![ConversationMessage::assistant(agent, RECOVERY_MESSAGE)],
        ..Default::default()
    }
}

fn step_summary(update: &StateUpdate) -> String {
    match update.messages.first() {
        Some(message) => {
            let content = message.content.trim();
            if content.chars().count() <= SUMMARY_MAX_CHARS {
                content.to_string()
            } else {
                let truncated: String = content.chars().take(SUMMARY_MAX_CHARS).collect();
                format!("{truncated}...")
            }
        }
        None => "(no message)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use concierge_types::agent::MessageRole;
    use concierge_types::conversation::PendingAction;
    use concierge_types::error::BackendError;

    use crate::graph::routing::Route;
    use crate::handler::{Handler, HandlerError};

    /// Handler that returns the same update on every invocation and
    /// counts how often it ran.
    struct Scripted {
        name: AgentName,
        update: StateUpdate,
        calls: Arc<AtomicU32>,
    }

    impl Scripted {
        fn new(name: AgentName, update: StateUpdate) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    name,
                    update,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl Handler for Scripted {
        fn name(&self) -> AgentName {
            self.name
        }

        async fn invoke(
            &self,
            _state: &ConversationState,
        ) -> Result<StateUpdate, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.update.clone())
        }
    }

    struct Failing(AgentName);

    impl Handler for Failing {
        fn name(&self) -> AgentName {
            self.0
        }

        async fn invoke(
            &self,
            _state: &ConversationState,
        ) -> Result<StateUpdate, HandlerError> {
            Err(HandlerError::Backend(BackendError::Unavailable(
                "mailbox down".to_string(),
            )))
        }
    }

    fn engine() -> Engine {
        Engine::new(EventBus::new(64))
    }

    fn say(agent: AgentName, text: &str) -> ConversationMessage {
        ConversationMessage::assistant(agent, text)
    }

    /// Route on the handler's declared `next_handler`, defaulting to End.
    fn on_next(destinations: impl IntoIterator<Item = Destination>) -> Route {
        Route::conditional(destinations, |state| {
            state.next_handler.unwrap_or(Destination::End)
        })
    }

    // -----------------------------------------------------------------------
    // Plain terminal run
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_supervisor_to_chitchat_to_end() {
        let (supervisor, _) = Scripted::new(
            AgentName::Supervisor,
            StateUpdate {
                next_handler: Some(Destination::Agent(AgentName::Chitchat)),
                ..Default::default()
            },
        );
        let (chitchat, _) = Scripted::new(
            AgentName::Chitchat,
            StateUpdate {
                next_handler: Some(Destination::End),
                messages: vec![say(AgentName::Chitchat, "Hi!")],
                ..Default::default()
            },
        );
        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::Supervisor)
            .register(
                supervisor,
                on_next([Destination::Agent(AgentName::Chitchat), Destination::End]),
            )
            .register(chitchat, on_next([Destination::End]))
            .build()
            .unwrap();

        let state = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap();

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, MessageRole::Assistant);
        assert_eq!(state.messages[0].content, "Hi!");
        assert_eq!(state.current_handler, Some(AgentName::Chitchat));
        assert!(!state.is_suspended());
    }

    #[tokio::test]
    async fn test_interaction_history_is_engine_authored() {
        let (supervisor, _) = Scripted::new(
            AgentName::Supervisor,
            StateUpdate {
                next_handler: Some(Destination::Agent(AgentName::Chitchat)),
                ..Default::default()
            },
        );
        let (chitchat, _) = Scripted::new(
            AgentName::Chitchat,
            StateUpdate {
                next_handler: Some(Destination::End),
                messages: vec![say(AgentName::Chitchat, "Hi!")],
                ..Default::default()
            },
        );
        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::Supervisor)
            .register(
                supervisor,
                on_next([Destination::Agent(AgentName::Chitchat), Destination::End]),
            )
            .register(chitchat, on_next([Destination::End]))
            .build()
            .unwrap();

        let state = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap();

        assert_eq!(state.interaction_history.len(), 2);
        assert_eq!(state.interaction_history[0].agent, AgentName::Supervisor);
        assert_eq!(state.interaction_history[0].summary, "(no message)");
        assert_eq!(state.interaction_history[1].agent, AgentName::Chitchat);
        assert_eq!(state.interaction_history[1].summary, "Hi!");
    }

    // -----------------------------------------------------------------------
    // Human-override precedence
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_requires_human_overrides_suggested_destination() {
        // The scheduler suggests supervisor, but the raised flag must win.
        let (scheduler, _) = Scripted::new(
            AgentName::Scheduler,
            StateUpdate {
                next_handler: Some(Destination::Agent(AgentName::Supervisor)),
                requires_human: Some(true),
                messages: vec![say(
                    AgentName::Scheduler,
                    "That slot conflicts with Team Meeting. Keep both?",
                )],
                ..Default::default()
            },
        );
        let (supervisor, supervisor_calls) =
            Scripted::new(AgentName::Supervisor, StateUpdate::default());
        let (gate, gate_calls) = Scripted::new(
            AgentName::HumanGate,
            StateUpdate {
                next_handler: Some(Destination::End),
                messages: vec![ConversationMessage::system(
                    AgentName::HumanGate,
                    "Waiting for your confirmation.",
                )],
                ..Default::default()
            },
        );

        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::Scheduler)
            .register(
                scheduler,
                on_next([Destination::Agent(AgentName::Supervisor), Destination::End]),
            )
            .register(supervisor, on_next([Destination::End]))
            .register(
                gate,
                on_next([Destination::Agent(AgentName::Supervisor), Destination::End]),
            )
            .build()
            .unwrap();

        let state = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap();

        assert_eq!(gate_calls.load(Ordering::SeqCst), 1, "gate must run next");
        assert_eq!(
            supervisor_calls.load(Ordering::SeqCst),
            0,
            "suggested destination must not run"
        );
        assert!(state.requires_human);
        assert!(state.is_suspended());
        assert_eq!(state.current_handler, Some(AgentName::HumanGate));
    }

    #[tokio::test]
    async fn test_gate_step_does_not_reenter_itself() {
        // With the flag still raised after the gate's waiting step, the
        // gate's own route must decide, otherwise the run would loop.
        let (gate, gate_calls) = Scripted::new(
            AgentName::HumanGate,
            StateUpdate {
                next_handler: Some(Destination::End),
                messages: vec![ConversationMessage::system(
                    AgentName::HumanGate,
                    "Waiting for your confirmation.",
                )],
                ..Default::default()
            },
        );
        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::HumanGate)
            .register(gate, on_next([Destination::End]))
            .build()
            .unwrap();

        let mut state = ConversationState::new("user-1");
        state.requires_human = true;

        let state = engine().run(&def, state).await.unwrap();
        assert_eq!(gate_calls.load(Ordering::SeqCst), 1);
        assert!(state.is_suspended());
    }

    #[tokio::test]
    async fn test_flag_persists_in_graph_without_gate() {
        // Polling-style graph: no gate registered, so the override is
        // vacuous and the flag simply persists into the stored state.
        let (email, _) = Scripted::new(
            AgentName::Email,
            StateUpdate {
                requires_human: Some(true),
                messages: vec![say(AgentName::Email, "This one needs your eyes.")],
                next_handler: Some(Destination::End),
                ..Default::default()
            },
        );
        let def = GraphDefinition::builder("polling-test", 5)
            .entry(AgentName::Email)
            .register(email, on_next([Destination::End]))
            .build()
            .unwrap();

        let state = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap();
        assert!(state.requires_human, "flag must survive for the next run");
    }

    // -----------------------------------------------------------------------
    // Routing violations and step limit
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_undeclared_destination_is_a_violation() {
        let (supervisor, _) = Scripted::new(AgentName::Supervisor, StateUpdate::default());
        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::Supervisor)
            .register(
                supervisor,
                // Declares only End but the rule wanders off to Booking.
                Route::conditional([Destination::End], |_| {
                    Destination::Agent(AgentName::Booking)
                }),
            )
            .build()
            .unwrap();

        let err = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap_err();
        match err {
            EngineError::RoutingViolation { from, to } => {
                assert_eq!(from, AgentName::Supervisor);
                assert_eq!(to, Destination::Agent(AgentName::Booking));
            }
            other => panic!("expected routing violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_step_limit_trips_at_exactly_max_steps() {
        // supervisor <-> chitchat with an exit declared but never taken.
        let (supervisor, supervisor_calls) = Scripted::new(
            AgentName::Supervisor,
            StateUpdate {
                next_handler: Some(Destination::Agent(AgentName::Chitchat)),
                ..Default::default()
            },
        );
        let (chitchat, chitchat_calls) = Scripted::new(
            AgentName::Chitchat,
            StateUpdate {
                next_handler: Some(Destination::Agent(AgentName::Supervisor)),
                ..Default::default()
            },
        );
        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::Supervisor)
            .register(
                supervisor,
                on_next([Destination::Agent(AgentName::Chitchat), Destination::End]),
            )
            .register(
                chitchat,
                on_next([Destination::Agent(AgentName::Supervisor), Destination::End]),
            )
            .build()
            .unwrap();

        let err = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StepLimitExceeded { max_steps: 10 }));

        let total =
            supervisor_calls.load(Ordering::SeqCst) + chitchat_calls.load(Ordering::SeqCst);
        assert_eq!(total, 10, "exactly max_steps handlers run, no more");
    }

    // -----------------------------------------------------------------------
    // Handler failure recovery
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_handler_failure_recovers_to_degraded_terminal() {
        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::Email)
            .register(Failing(AgentName::Email), on_next([Destination::End]))
            .build()
            .unwrap();

        let state = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap();

        assert!(!state.requires_human);
        assert!(!state.is_suspended());
        let last = state.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert!(last.content.contains("try again"));
    }

    // -----------------------------------------------------------------------
    // Pending actions and per-step next_handler
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_schedule_action_flows_to_scheduler() {
        let (email, _) = Scripted::new(
            AgentName::Email,
            StateUpdate {
                messages: vec![say(AgentName::Email, "Drafted a reply.")],
                pending_actions: vec![PendingAction::schedule(
                    json!({"title": "Call with John"}),
                    AgentName::Email,
                )],
                ..Default::default()
            },
        );
        // Scheduler consumes whatever schedule actions it finds.
        struct Consume(Arc<AtomicU32>);
        impl Handler for Consume {
            fn name(&self) -> AgentName {
                AgentName::Scheduler
            }
            async fn invoke(
                &self,
                state: &ConversationState,
            ) -> Result<StateUpdate, HandlerError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(StateUpdate {
                    consumed_actions: state.pending_actions.iter().map(|a| a.id).collect(),
                    messages: vec![ConversationMessage::assistant(
                        AgentName::Scheduler,
                        "Event created.",
                    )],
                    next_handler: Some(Destination::End),
                    ..Default::default()
                })
            }
        }
        let scheduler_calls = Arc::new(AtomicU32::new(0));

        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::Email)
            .register(
                email,
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
                Consume(Arc::clone(&scheduler_calls)),
                Route::conditional([Destination::End], |state| {
                    state.next_handler.unwrap_or(Destination::End)
                }),
            )
            .build()
            .unwrap();

        let state = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap();

        assert_eq!(scheduler_calls.load(Ordering::SeqCst), 1);
        assert!(state.pending_actions.is_empty(), "action must be consumed");
    }

    #[tokio::test]
    async fn test_next_handler_does_not_leak_across_steps() {
        let (supervisor, _) = Scripted::new(
            AgentName::Supervisor,
            StateUpdate {
                next_handler: Some(Destination::Agent(AgentName::Chitchat)),
                ..Default::default()
            },
        );
        // Chitchat sets nothing; if the supervisor's choice leaked, the
        // routing function would re-route to chitchat and trip the limit.
        let (chitchat, chitchat_calls) =
            Scripted::new(AgentName::Chitchat, StateUpdate::default());

        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::Supervisor)
            .register(
                supervisor,
                on_next([Destination::Agent(AgentName::Chitchat), Destination::End]),
            )
            .register(
                chitchat,
                on_next([Destination::Agent(AgentName::Chitchat), Destination::End]),
            )
            .build()
            .unwrap();

        let state = engine()
            .run(&def, ConversationState::new("user-1"))
            .await
            .unwrap();
        assert_eq!(chitchat_calls.load(Ordering::SeqCst), 1);
        assert!(!state.is_suspended());
    }

    // -----------------------------------------------------------------------
    // Resume path through the gate
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_gate_consumes_feedback_and_returns_to_supervisor() {
        struct Gate;
        impl Handler for Gate {
            fn name(&self) -> AgentName {
                AgentName::HumanGate
            }
            async fn invoke(
                &self,
                state: &ConversationState,
            ) -> Result<StateUpdate, HandlerError> {
                if state.human_feedback.is_some() {
                    Ok(StateUpdate {
                        clear_feedback: true,
                        next_handler: Some(Destination::Agent(AgentName::Supervisor)),
                        ..Default::default()
                    })
                } else {
                    Ok(StateUpdate {
                        next_handler: Some(Destination::End),
                        messages: vec![ConversationMessage::system(
                            AgentName::HumanGate,
                            "Waiting for your confirmation.",
                        )],
                        ..Default::default()
                    })
                }
            }
        }
        let (supervisor, supervisor_calls) = Scripted::new(
            AgentName::Supervisor,
            StateUpdate {
                next_handler: Some(Destination::End),
                messages: vec![say(AgentName::Supervisor, "Done.")],
                ..Default::default()
            },
        );

        let def = GraphDefinition::builder("test", 10)
            .entry(AgentName::HumanGate)
            .register(
                Gate,
                on_next([Destination::Agent(AgentName::Supervisor), Destination::End]),
            )
            .register(supervisor, on_next([Destination::End]))
            .build()
            .unwrap();

        let mut state = ConversationState::new("user-1");
        state.resume_with("go ahead");

        let state = engine().run(&def, state).await.unwrap();
        assert_eq!(supervisor_calls.load(Ordering::SeqCst), 1);
        assert!(state.human_feedback.is_none(), "feedback must be consumed");
        assert!(!state.is_suspended());
    }
}
