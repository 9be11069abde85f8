//! Structured decision payloads produced by the decision provider.
//!
//! Each handler constrains generation to one of these types via its JSON
//! schema and deserializes the raw response back into it. Doc comments on
//! fields double as schema descriptions, so keep them written for the
//! model, not for rustdoc.
//!
//! `decision_schema::<T>()` derives the schema and post-processes it for
//! strict structured output: every object is closed and every property is
//! required (optional fields stay nullable).

use schemars::{JsonSchema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::fmt;

use crate::conversation::Destination;
use crate::emotion::AlertLevel;

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Destinations the supervisor may pick. `End` closes the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorRoute {
    Email,
    Scheduler,
    Booking,
    Chitchat,
    Wellbeing,
    End,
}

impl SupervisorRoute {
    pub fn destination(self) -> Destination {
        use crate::agent::AgentName;
        match self {
            SupervisorRoute::Email => Destination::Agent(AgentName::Email),
            SupervisorRoute::Scheduler => Destination::Agent(AgentName::Scheduler),
            SupervisorRoute::Booking => Destination::Agent(AgentName::Booking),
            SupervisorRoute::Chitchat => Destination::Agent(AgentName::Chitchat),
            SupervisorRoute::Wellbeing => Destination::Agent(AgentName::Wellbeing),
            SupervisorRoute::End => Destination::End,
        }
    }
}

/// Intent classification for the latest user message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SupervisorDecision {
    /// The specialist that should handle the message, or `end` if the
    /// conversation is complete.
    pub next_agent: SupervisorRoute,
    /// One short sentence explaining the choice.
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmailAction {
    /// Draft a reply to an existing email.
    Reply,
    /// Compose and send a brand new email.
    SendNew,
}

impl fmt::Display for EmailAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailAction::Reply => write!(f, "reply"),
            EmailAction::SendNew => write!(f, "send_new"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Calendar event details extracted from natural language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalendarEventDraft {
    pub title: String,
    /// ISO 8601 start time, e.g. "2025-01-21T14:00:00Z".
    pub start_time: String,
    /// ISO 8601 end time, or null if open-ended.
    pub end_time: Option<String>,
    /// Email addresses of attendees, empty if none mentioned.
    pub attendees: Vec<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// What to do with the email currently under consideration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmailDecision {
    pub action: EmailAction,
    pub priority: Priority,
    /// The drafted reply body, or null when no reply is needed.
    pub draft_reply: Option<String>,
    /// True when the email asks for a meeting or call that the scheduler
    /// should turn into a calendar event.
    pub requires_scheduling: bool,
    /// The event to schedule; must be set when `requires_scheduling` is
    /// true.
    pub calendar_event: Option<CalendarEventDraft>,
    /// True for emails that deserve the user's prompt attention.
    pub is_important: bool,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerAction {
    CreateEvent,
    CreateTodo,
    SetReminder,
    ListEvents,
}

impl fmt::Display for SchedulerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerAction::CreateEvent => write!(f, "create_event"),
            SchedulerAction::CreateTodo => write!(f, "create_todo"),
            SchedulerAction::SetReminder => write!(f, "set_reminder"),
            SchedulerAction::ListEvents => write!(f, "list_events"),
        }
    }
}

/// Interpretation of a scheduling request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SchedulerDecision {
    pub action: SchedulerAction,
    /// The event to create; required for `create_event`, null otherwise.
    pub event: Option<CalendarEventDraft>,
    /// Todo text; required for `create_todo`, null otherwise.
    pub todo: Option<String>,
    /// ISO 8601 reminder time; required for `set_reminder`, null otherwise.
    pub reminder_time: Option<String>,
    /// Alternative slots to offer if the requested one does not work.
    pub suggestions: Vec<String>,
    /// True when the request is ambiguous enough that the user should
    /// confirm before anything is written to the calendar.
    pub requires_confirmation: bool,
}

// ---------------------------------------------------------------------------
// Booking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
    Flight,
    Hotel,
    Restaurant,
}

impl fmt::Display for BookingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingType::Flight => write!(f, "flight"),
            BookingType::Hotel => write!(f, "hotel"),
            BookingType::Restaurant => write!(f, "restaurant"),
        }
    }
}

/// Parameter extraction for a booking request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BookingDecision {
    pub booking_type: BookingType,
    /// True when required parameters are still missing from the request.
    pub requires_more_info: bool,
    /// Names of the missing parameters, e.g. "destination", "dates".
    pub missing_params: Vec<String>,
    /// True when enough parameters are known to search for options.
    pub ready_to_search: bool,
    /// Compact search query summarizing the gathered parameters, or null
    /// until `ready_to_search` is true.
    pub search_query: Option<String>,
}

// ---------------------------------------------------------------------------
// Chitchat
// ---------------------------------------------------------------------------

/// Specialists a casual conversation can hand off to mid-chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTarget {
    Email,
    Scheduler,
    Booking,
}

impl EscalationTarget {
    pub fn destination(self) -> Destination {
        use crate::agent::AgentName;
        match self {
            EscalationTarget::Email => Destination::Agent(AgentName::Email),
            EscalationTarget::Scheduler => Destination::Agent(AgentName::Scheduler),
            EscalationTarget::Booking => Destination::Agent(AgentName::Booking),
        }
    }
}

/// A conversational reply, plus whether the message actually belongs to a
/// specialist.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChitchatDecision {
    /// The reply to show the user.
    pub response_text: String,
    /// Short intent label, e.g. "greeting", "gratitude", "smalltalk".
    pub detected_intent: String,
    /// True when the message is really an email, scheduling, or booking
    /// request in disguise.
    pub requires_escalation: bool,
    /// The specialist to escalate to; must be set when
    /// `requires_escalation` is true.
    pub escalate_to: Option<EscalationTarget>,
}

// ---------------------------------------------------------------------------
// Wellbeing
// ---------------------------------------------------------------------------

/// Sentiment read over the recent interaction history.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WellbeingDecision {
    /// Overall sentiment from -1.0 (negative) to 1.0 (positive).
    pub sentiment_score: f32,
    /// Dominant emotion, e.g. "calm", "frustrated", "anxious".
    pub emotion_detected: String,
    /// Stress estimate from 0.0 (relaxed) to 10.0 (acute).
    pub stress_level: f32,
    pub alert_level: AlertLevel,
    /// Direction of sentiment over the recent history: "improving",
    /// "stable", or "declining".
    pub trending_sentiment: String,
    /// Short supportive suggestions, empty when nothing is warranted.
    pub recommendations: Vec<String>,
    /// True when the user would benefit from being nudged to pause.
    pub should_suggest_break: bool,
}

// ---------------------------------------------------------------------------
// Schema derivation
// ---------------------------------------------------------------------------

/// Derive the JSON schema for a decision type, post-processed for strict
/// structured output.
pub fn decision_schema<T: JsonSchema>() -> Value {
    let schema = SchemaGenerator::default().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema)
        .expect("decision schema serialization should not fail");
    add_additional_properties_false(&mut value);
    require_all_properties(&mut value);
    value
}

/// Recursively mark every object schema as closed.
pub fn add_additional_properties_false(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let is_object_schema = matches!(map.get("type"), Some(Value::String(t)) if t == "object")
                || map.contains_key("properties");
            if is_object_schema && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for child in map.values_mut() {
                add_additional_properties_false(child);
            }
        }
        Value::Array(items) => {
            for child in items {
                add_additional_properties_false(child);
            }
        }
        _ => {}
    }
}

/// Recursively list every property as required. Strict-mode providers
/// insist on this; optional fields remain expressible as null.
pub fn require_all_properties(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(properties)) = map.get("properties") {
                let keys: Vec<Value> = properties
                    .keys()
                    .map(|k| Value::String(k.clone()))
                    .collect();
                map.insert("required".to_string(), Value::Array(keys));
            }
            for child in map.values_mut() {
                require_all_properties(child);
            }
        }
        Value::Array(items) => {
            for child in items {
                require_all_properties(child);
            }
        }
        _ => {}
    }
}
