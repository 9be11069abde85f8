//! Calendar events, todos, reminders, and conflict checks.
//!
//! Consumes every queued schedule action (typically enqueued by the email
//! handler) in the same step, so a meeting request never survives past the
//! scheduler that saw it. Writes to the calendar happen only when the slot
//! is free and no confirmation is pending; a conflicting or ambiguous
//! request leaves the calendar untouched and suspends the run for the
//! user's decision.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use concierge_core::decision::{BoxDecisionProvider, DecisionRequest};
use concierge_core::handler::{Handler, HandlerError};
use concierge_types::agent::{AgentName, ConversationMessage};
use concierge_types::conversation::{ActionKind, ConversationState, StateUpdate};
use concierge_types::decision::{
    decision_schema, CalendarEventDraft, SchedulerAction, SchedulerDecision,
};

use crate::prompts::SCHEDULER_PROMPT;
use crate::tools::{CalendarBackend, CalendarEvent};

const TRANSCRIPT_WINDOW: usize = 12;

/// How far ahead `list_events` looks.
const LISTING_HORIZON_DAYS: i64 = 7;

pub struct SchedulerAgent<C: CalendarBackend> {
    provider: Arc<BoxDecisionProvider>,
    calendar: C,
}

impl<C: CalendarBackend> SchedulerAgent<C> {
    pub fn new(provider: Arc<BoxDecisionProvider>, calendar: C) -> Self {
        Self { provider, calendar }
    }

    fn build_input(state: &ConversationState, schedule_requests: &[Value]) -> String {
        let mut input = format!(
            "User ID: {}\nCurrent time: {}\n",
            state.user_id,
            Utc::now().to_rfc3339(),
        );
        if !schedule_requests.is_empty() {
            input.push_str(&format!(
                "Pending schedule requests: {}\n",
                Value::Array(schedule_requests.to_vec())
            ));
        }
        if let Some(events) = state.scheduler_data.get("calendar_events") {
            input.push_str(&format!("Known events: {events}\n"));
        }
        input.push('\n');
        input.push_str(&super::render_transcript(state, TRANSCRIPT_WINDOW));
        input
    }

    fn parse_event_times(
        draft: &CalendarEventDraft,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), HandlerError> {
        let start = parse_rfc3339(&draft.start_time)?;
        let end = match &draft.end_time {
            Some(raw) => parse_rfc3339(raw)?,
            None => start + Duration::hours(1),
        };
        Ok((start, end))
    }

    async fn create_event(
        &self,
        state: &ConversationState,
        decision: &SchedulerDecision,
        draft: &CalendarEventDraft,
        scheduler_updates: &mut Map<String, Value>,
        context: &mut Map<String, Value>,
    ) -> Result<(String, Option<bool>), HandlerError> {
        let (start, end) = Self::parse_event_times(draft)?;

        let conflicts = self
            .calendar
            .check_conflicts(&state.user_id, start, end)
            .await?;
        if !conflicts.is_empty() {
            let titles = conflicts
                .iter()
                .map(|c| c.title.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let suggestions = if decision.suggestions.is_empty() {
                "none".to_string()
            } else {
                decision.suggestions.join(", ")
            };
            scheduler_updates.insert(
                "conflicts".to_string(),
                serde_json::to_value(&conflicts)
                    .map_err(|err| HandlerError::Internal(err.to_string()))?,
            );
            context.insert("conflicts_found".to_string(), json!(true));
            // A conflict is the user's call to make, so the run suspends
            // here no matter where the supervisor wanted to go next.
            return Ok((
                format!(
                    "⚠️ Scheduling conflict detected: {titles}. Suggestions: {suggestions}"
                ),
                Some(true),
            ));
        }

        if decision.requires_confirmation {
            // Nothing is written while a confirmation is outstanding.
            return Ok((
                format!(
                    "⚠️ Please confirm: create event \"{}\" starting {}? Nothing has been added yet.",
                    draft.title, draft.start_time
                ),
                Some(true),
            ));
        }

        let event = CalendarEvent {
            id: Uuid::now_v7().to_string(),
            title: draft.title.clone(),
            start,
            end,
            location: draft.location.clone(),
            attendees: draft.attendees.clone(),
            description: draft.description.clone(),
        };
        self.calendar
            .create_event(&state.user_id, event.clone())
            .await?;

        let mut events: Vec<Value> = state
            .scheduler_data
            .get("calendar_events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        events.push(
            serde_json::to_value(&event).map_err(|err| HandlerError::Internal(err.to_string()))?,
        );
        scheduler_updates.insert("calendar_events".to_string(), Value::Array(events));

        Ok((format!("✓ Event created: {}", draft.title), None))
    }
}

impl<C: CalendarBackend> Handler for SchedulerAgent<C> {
    fn name(&self) -> AgentName {
        AgentName::Scheduler
    }

    async fn invoke(&self, state: &ConversationState) -> Result<StateUpdate, HandlerError> {
        let schedule_actions: Vec<_> = state
            .pending_actions
            .iter()
            .filter(|action| action.kind == ActionKind::Schedule)
            .collect();
        let payloads: Vec<Value> = schedule_actions
            .iter()
            .map(|action| action.payload.clone())
            .collect();
        let consumed_actions: Vec<Uuid> =
            schedule_actions.iter().map(|action| action.id).collect();

        let request = DecisionRequest::new(
            "SchedulerDecision",
            decision_schema::<SchedulerDecision>(),
            SCHEDULER_PROMPT,
            Self::build_input(state, &payloads),
        );
        let decision: SchedulerDecision = self.provider.generate_as(&request).await?;

        let mut scheduler_updates = Map::new();
        let mut context = Map::new();
        context.insert("conflicts_found".to_string(), json!(false));

        let (response_message, requires_human) = match decision.action {
            SchedulerAction::CreateEvent => {
                let draft = decision.event.as_ref().ok_or_else(|| {
                    HandlerError::Internal("create_event decision without event details".to_string())
                })?;
                self.create_event(state, &decision, draft, &mut scheduler_updates, &mut context)
                    .await?
            }
            SchedulerAction::CreateTodo => {
                let task = decision.todo.as_deref().ok_or_else(|| {
                    HandlerError::Internal("create_todo decision without todo text".to_string())
                })?;
                self.calendar.create_todo(&state.user_id, task).await?;
                (format!("✓ Todo added: {task}"), None)
            }
            SchedulerAction::SetReminder => {
                let raw = decision.reminder_time.as_deref().ok_or_else(|| {
                    HandlerError::Internal("set_reminder decision without a time".to_string())
                })?;
                let remind_at = parse_rfc3339(raw)?;
                let note = state.last_user_message().unwrap_or("Reminder");
                self.calendar
                    .set_reminder(&state.user_id, note, remind_at)
                    .await?;
                (format!("✓ Reminder set for: {raw}"), None)
            }
            SchedulerAction::ListEvents => {
                let now = Utc::now();
                let events = self
                    .calendar
                    .events_between(&state.user_id, now, now + Duration::days(LISTING_HORIZON_DAYS))
                    .await?;
                let listing = if events.is_empty() {
                    "none".to_string()
                } else {
                    events
                        .iter()
                        .map(|e| format!("{} at {}", e.title, e.start.to_rfc3339()))
                        .collect::<Vec<_>>()
                        .join("; ")
                };
                (format!("Your upcoming events: {listing}"), None)
            }
        };

        context.insert(
            "last_schedule_action".to_string(),
            json!(decision.action.to_string()),
        );

        tracing::debug!(
            conversation_id = %state.conversation_id,
            action = %decision.action,
            consumed = consumed_actions.len(),
            awaiting_confirmation = requires_human.unwrap_or(false),
            "schedule handled"
        );

        Ok(StateUpdate {
            next_handler: None,
            requires_human,
            scheduler_data: scheduler_updates,
            context,
            messages: vec![ConversationMessage::assistant(
                AgentName::Scheduler,
                response_message,
            )],
            consumed_actions,
            ..Default::default()
        })
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, HandlerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| HandlerError::Internal(format!("unparseable time '{raw}': {err}")))
}
