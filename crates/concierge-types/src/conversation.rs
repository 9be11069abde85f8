//! Conversation state, partial updates, and the merge policy.
//!
//! `ConversationState` is the record threaded through one engine run. Every
//! field belongs to exactly one merge class:
//!
//! - **Replace**: last write wins; an absent field in a [`StateUpdate`]
//!   leaves the current value untouched.
//! - **Shallow-merge**: string-keyed maps merged key by key -- new keys
//!   added, existing keys overwritten, other keys untouched.
//! - **Accumulate**: ordered append; prior entries are never reordered or
//!   edited. Pending actions are the one exception: an update may list
//!   action ids to consume, and [`ConversationState::apply`] is the only
//!   code that removes them.
//! - **Identity**: set at creation, absent from [`StateUpdate`] entirely,
//!   so no handler can touch them.
//!
//! The policy table lives in [`ConversationState::apply`] and nowhere else;
//! handlers declare intent, they do not merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use std::fmt;

use crate::agent::{AgentName, ConversationMessage};
use crate::emotion::EmotionSnapshot;

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

/// Where a step hands off to next: another handler, or the terminal marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Destination {
    Agent(AgentName),
    /// Terminal marker: the run stops (or suspends, see
    /// `ConversationState::is_suspended`).
    End,
}

impl Destination {
    pub fn as_agent(&self) -> Option<AgentName> {
        match self {
            Destination::Agent(name) => Some(*name),
            Destination::End => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Destination::End)
    }
}

impl From<AgentName> for Destination {
    fn from(name: AgentName) -> Self {
        Destination::Agent(name)
    }
}

impl From<Destination> for String {
    fn from(dest: Destination) -> Self {
        dest.to_string()
    }
}

impl TryFrom<String> for Destination {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.eq_ignore_ascii_case("end") {
            return Ok(Destination::End);
        }
        s.parse::<AgentName>().map(Destination::Agent)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Agent(name) => write!(f, "{name}"),
            Destination::End => write!(f, "end"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pending actions
// ---------------------------------------------------------------------------

/// The closed set of deferred-work kinds handlers can enqueue for each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A scheduling request (calendar event payload) for the scheduler.
    Schedule,
}

/// A typed unit of deferred work produced by one handler for another.
///
/// Ids are time-sortable v7 uuids; consumption is by id through
/// [`StateUpdate::consumed_actions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub kind: ActionKind,
    pub payload: Value,
    pub source: AgentName,
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    /// A scheduling request carrying a calendar-event payload.
    pub fn schedule(payload: Value, source: AgentName) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind: ActionKind::Schedule,
            payload,
            source,
            created_at: Utc::now(),
        }
    }
}

/// One step of an engine run, recorded by the engine itself during merge.
/// Handlers cannot write history; the wellbeing handler reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub agent: AgentName,
    pub summary: String,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Conversation state
// ---------------------------------------------------------------------------

/// The mutable record threaded through one engine run.
///
/// Owned exclusively by the running engine invocation; between runs it is
/// owned by the conversation store and handed over by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    // Identity, set once at creation.
    pub conversation_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,

    // Replace fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_handler: Option<AgentName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_handler: Option<Destination>,
    #[serde(default)]
    pub requires_human: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_state: Option<EmotionSnapshot>,

    // Shallow-merged maps.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub email_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub scheduler_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub booking_data: Map<String, Value>,

    // Accumulate fields.
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_actions: Vec<PendingAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interaction_history: Vec<InteractionRecord>,
}

impl ConversationState {
    /// Fresh state for a new conversation; all accumulate fields empty.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Uuid::now_v7(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            current_handler: None,
            next_handler: None,
            requires_human: false,
            human_feedback: None,
            stress_level: None,
            emotion_state: None,
            context: Map::new(),
            email_data: Map::new(),
            scheduler_data: Map::new(),
            booking_data: Map::new(),
            messages: Vec::new(),
            pending_actions: Vec::new(),
            interaction_history: Vec::new(),
        }
    }

    /// Apply a partial update per the merge policy table.
    ///
    /// This is the only mutation path handlers have. Clearing feedback wins
    /// over setting it within one update.
    pub fn apply(&mut self, update: StateUpdate) {
        // Replace fields.
        if let Some(next) = update.next_handler {
            self.next_handler = Some(next);
        }
        if let Some(flag) = update.requires_human {
            self.requires_human = flag;
        }
        if let Some(feedback) = update.human_feedback {
            self.human_feedback = Some(feedback);
        }
        if update.clear_feedback {
            self.human_feedback = None;
        }
        if let Some(level) = update.stress_level {
            self.stress_level = Some(level);
        }
        if let Some(snapshot) = update.emotion_state {
            self.emotion_state = Some(snapshot);
        }

        // Shallow merges.
        shallow_merge(&mut self.context, update.context);
        shallow_merge(&mut self.email_data, update.email_data);
        shallow_merge(&mut self.scheduler_data, update.scheduler_data);
        shallow_merge(&mut self.booking_data, update.booking_data);

        // Consumption removes existing entries before new ones append, so a
        // handler can never consume what it enqueued in the same step.
        if !update.consumed_actions.is_empty() {
            self.pending_actions
                .retain(|action| !update.consumed_actions.contains(&action.id));
        }

        // Accumulate fields.
        self.messages.extend(update.messages);
        self.pending_actions.extend(update.pending_actions);
    }

    /// Seed a suspended conversation for re-entry per the resume protocol:
    /// feedback recorded, human override lowered, the reply appended as a
    /// user message.
    pub fn resume_with(&mut self, feedback: impl Into<String>) {
        let feedback = feedback.into();
        self.requires_human = false;
        self.messages.push(ConversationMessage::user(&feedback));
        self.human_feedback = Some(feedback);
    }

    /// A state is suspended (awaiting a human, not finished) when the
    /// override flag is up, or when the gate ran last without feedback to
    /// consume.
    pub fn is_suspended(&self) -> bool {
        self.requires_human
            || (self.current_handler == Some(AgentName::HumanGate)
                && self.human_feedback.is_none())
    }

    /// Any schedule requests still queued?
    pub fn has_schedule_actions(&self) -> bool {
        self.pending_actions
            .iter()
            .any(|action| action.kind == ActionKind::Schedule)
    }

    /// Content of the most recent assistant message, if any. This is what
    /// the chat entry point surfaces as `response_text`.
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::agent::MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Content of the most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::agent::MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

fn shallow_merge(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        target.insert(key, value);
    }
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// What a handler returns: only the fields it intends to set or append.
///
/// Identity fields and `current_handler`/`interaction_history` are absent by
/// design -- the former are immutable, the latter are engine-authored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_handler: Option<Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_human: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    /// Consume any stored feedback. Wins over `human_feedback` if both are
    /// set in one update.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear_feedback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_state: Option<EmotionSnapshot>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub email_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub scheduler_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub booking_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ConversationMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_actions: Vec<PendingAction>,
    /// Ids of pending actions this step consumed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumed_actions: Vec<Uuid>,
}
