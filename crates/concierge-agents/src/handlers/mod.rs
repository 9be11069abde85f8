//! The handlers that populate the routing graphs.
//!
//! Each handler is one [`concierge_core::handler::Handler`] implementation:
//! it reads the conversation state, makes at most one decision call plus
//! the backend work its domain action needs, and returns a partial update.
//! Handlers never merge state themselves and never talk to each other
//! except through the state they update.

pub mod booking;
pub mod chitchat;
pub mod email;
pub mod gate;
pub mod mailbox;
pub mod scheduler;
pub mod supervisor;
pub mod wellbeing;

pub use booking::BookingAgent;
pub use chitchat::ChitchatAgent;
pub use email::EmailAgent;
pub use gate::HumanGate;
pub use mailbox::MailboxPollAgent;
pub use scheduler::SchedulerAgent;
pub use supervisor::SupervisorAgent;
pub use wellbeing::WellbeingAgent;

use concierge_types::agent::MessageRole;
use concierge_types::conversation::ConversationState;

/// Render the last `limit` messages as plain "role: content" lines for a
/// decision prompt. Assistant and system lines name the producing handler.
pub(crate) fn render_transcript(state: &ConversationState, limit: usize) -> String {
    let start = state.messages.len().saturating_sub(limit);
    state.messages[start..]
        .iter()
        .map(|message| match (message.role, message.agent) {
            (MessageRole::User, _) => format!("user: {}", message.content),
            (role, Some(agent)) => format!("{role} ({agent}): {}", message.content),
            (role, None) => format!("{role}: {}", message.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
