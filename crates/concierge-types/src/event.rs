//! Event types for the engine event bus.
//!
//! `EngineEvent` is the unified event type broadcast while conversations
//! run. All variants are Clone + Send + Sync for use with tokio broadcast
//! channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentName;
use crate::conversation::Destination;

/// Events emitted during engine execution.
///
/// Used by the event bus to communicate run lifecycle, suspension, and
/// polling activity to subscribers (logging, metrics, tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An engine run has started.
    RunStarted {
        conversation_id: Uuid,
        user_id: String,
        entry: AgentName,
    },

    /// One handler invocation finished and its update was merged.
    StepCompleted {
        conversation_id: Uuid,
        /// 1-based position of the step within its run.
        step: u32,
        agent: AgentName,
        destination: Destination,
    },

    /// The run stopped at the human gate; the conversation now awaits
    /// feedback.
    RunSuspended {
        conversation_id: Uuid,
        suspended_by: AgentName,
    },

    /// The run reached the terminal marker.
    RunCompleted {
        conversation_id: Uuid,
        steps: u32,
        duration_ms: u64,
    },

    /// The run failed with a routing violation or step-limit trip.
    RunFailed {
        conversation_id: Uuid,
        error: String,
    },

    /// A handler's collaborator call failed and the run was recovered
    /// into a degraded terminal state.
    HandlerRecovered {
        conversation_id: Uuid,
        agent: AgentName,
        error: String,
    },

    /// A polling tick has started.
    TickStarted { tick: u64, user_id: String },

    /// A polling tick ran to completion.
    TickCompleted {
        tick: u64,
        user_id: String,
        events_found: u32,
        duration_ms: u64,
    },

    /// A polling tick failed; the schedule continues.
    TickFailed {
        tick: u64,
        user_id: String,
        error: String,
    },
}

impl EngineEvent {
    /// Returns the conversation_id from variants that carry one, or None
    /// for tick-scoped events.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            EngineEvent::RunStarted { conversation_id, .. }
            | EngineEvent::StepCompleted { conversation_id, .. }
            | EngineEvent::RunSuspended { conversation_id, .. }
            | EngineEvent::RunCompleted { conversation_id, .. }
            | EngineEvent::RunFailed { conversation_id, .. }
            | EngineEvent::HandlerRecovered { conversation_id, .. } => Some(*conversation_id),

            EngineEvent::TickStarted { .. }
            | EngineEvent::TickCompleted { .. }
            | EngineEvent::TickFailed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_uuid() -> Uuid {
        Uuid::now_v7()
    }

    #[test]
    fn test_step_completed_serde_roundtrip() {
        let event = EngineEvent::StepCompleted {
            conversation_id: sample_uuid(),
            step: 3,
            agent: AgentName::Email,
            destination: Destination::Agent(AgentName::Scheduler),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"step_completed\""));
        assert!(json.contains("\"destination\":\"scheduler\""));

        let parsed: EngineEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            EngineEvent::StepCompleted { step, agent, .. } => {
                assert_eq!(step, 3);
                assert_eq!(agent, AgentName::Email);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_run_suspended_tag() {
        let event = EngineEvent::RunSuspended {
            conversation_id: sample_uuid(),
            suspended_by: AgentName::HumanGate,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"run_suspended\""));
        assert!(json.contains("\"suspended_by\":\"human_gate\""));
    }

    #[test]
    fn test_conversation_id_helper() {
        let id = sample_uuid();
        let event = EngineEvent::RunCompleted {
            conversation_id: id,
            steps: 4,
            duration_ms: 120,
        };
        assert_eq!(event.conversation_id(), Some(id));

        let tick = EngineEvent::TickFailed {
            tick: 9,
            user_id: "default".to_string(),
            error: "mailbox unavailable".to_string(),
        };
        assert_eq!(tick.conversation_id(), None);
    }
}
