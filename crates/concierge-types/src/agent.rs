//! Handler identity and conversation message types.
//!
//! `AgentName` is the closed set of handlers a graph may contain. Routing
//! destinations, state markers, and decision schemas all use this enum, so
//! an unknown handler name is unrepresentable outside the serde boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// The closed set of handler names.
///
/// Graph definitions validate entry points and destination sets against
/// this enum at build time; the engine never compares raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    /// Intent classifier and interactive entry point.
    Supervisor,
    /// Mailbox triage, reply drafting, schedule extraction.
    Email,
    /// Calendar events, todos, reminders, conflict checks.
    Scheduler,
    /// Travel and reservation search; always human-confirmed.
    Booking,
    /// Casual conversation and escalation detection.
    Chitchat,
    /// Emotional-state annotation; never steers the conversation.
    Wellbeing,
    /// Suspend/resume boundary for human approval.
    HumanGate,
    /// Unattended mailbox ingestion; polling-graph entry point.
    MailboxPoll,
}

impl AgentName {
    /// All handler names, in supervisor-first order.
    pub const ALL: [AgentName; 8] = [
        AgentName::Supervisor,
        AgentName::Email,
        AgentName::Scheduler,
        AgentName::Booking,
        AgentName::Chitchat,
        AgentName::Wellbeing,
        AgentName::HumanGate,
        AgentName::MailboxPoll,
    ];

    /// Stable wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Supervisor => "supervisor",
            AgentName::Email => "email",
            AgentName::Scheduler => "scheduler",
            AgentName::Booking => "booking",
            AgentName::Chitchat => "chitchat",
            AgentName::Wellbeing => "wellbeing",
            AgentName::HumanGate => "human_gate",
            AgentName::MailboxPoll => "mailbox_poll",
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "supervisor" => Ok(AgentName::Supervisor),
            "email" => Ok(AgentName::Email),
            "scheduler" => Ok(AgentName::Scheduler),
            "booking" => Ok(AgentName::Booking),
            "chitchat" => Ok(AgentName::Chitchat),
            "wellbeing" => Ok(AgentName::Wellbeing),
            "human_gate" => Ok(AgentName::HumanGate),
            "mailbox_poll" => Ok(AgentName::MailboxPoll),
            other => Err(format!("invalid agent name: '{other}'")),
        }
    }
}

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// A single entry in a conversation's message history.
///
/// Messages are append-only: once in the history they are never edited or
/// reordered. `agent` records which handler produced an assistant or
/// system message; user messages leave it unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentName>,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    /// A message typed by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::User,
            content: content.into(),
            agent: None,
            created_at: Utc::now(),
        }
    }

    /// An assistant-voiced message produced by `agent`.
    pub fn assistant(agent: AgentName, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::Assistant,
            content: content.into(),
            agent: Some(agent),
            created_at: Utc::now(),
        }
    }

    /// A system note produced by `agent` (e.g. the gate's waiting notice).
    pub fn system(agent: AgentName, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::System,
            content: content.into(),
            agent: Some(agent),
            created_at: Utc::now(),
        }
    }
}
