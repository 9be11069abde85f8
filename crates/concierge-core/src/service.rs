//! Conversation service: the chat and resume entry points.
//!
//! Wraps the engine with persistence. Every load/run/persist cycle for a
//! user happens under that user's lock, so an interactive turn and a
//! polling tick can never interleave their writes to the shared scratch
//! records.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use concierge_types::agent::{AgentName, ConversationMessage};
use concierge_types::conversation::{ConversationState, PendingAction};
use concierge_types::emotion::EmotionSnapshot;
use concierge_types::error::StoreError;

use crate::engine::{Engine, EngineError};
use crate::graph::definition::GraphDefinition;
use crate::store::{ConversationStore, UserScratch};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("conversation not found")]
    NotFound,

    #[error("conversation is not awaiting human input")]
    NotSuspended,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one chat or resume turn returns to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub conversation_id: Uuid,
    pub response_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_handler: Option<AgentName>,
    /// True when the conversation is suspended awaiting the user.
    pub requires_action: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_actions: Vec<PendingAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion_state: Option<EmotionSnapshot>,
}

impl ChatOutcome {
    fn from_state(state: &ConversationState) -> Self {
        Self {
            conversation_id: state.conversation_id,
            response_text: state
                .last_assistant_message()
                .unwrap_or_default()
                .to_string(),
            current_handler: state.current_handler,
            requires_action: state.is_suspended(),
            pending_actions: state.pending_actions.clone(),
            emotion_state: state.emotion_state.clone(),
        }
    }
}

/// Orchestrates engine runs over stored conversations.
///
/// Generic over `S: ConversationStore` so tests can use the in-memory
/// store and deployments can swap in a durable one.
pub struct ConversationService<S> {
    store: S,
    engine: Engine,
    graph: Arc<GraphDefinition>,
}

impl<S: ConversationStore> ConversationService<S> {
    pub fn new(store: S, engine: Engine, graph: Arc<GraphDefinition>) -> Self {
        Self {
            store,
            engine,
            graph,
        }
    }

    /// Handle one user message. Starts a new conversation when no id is
    /// given; a message sent to a suspended conversation is treated as
    /// the awaited feedback.
    pub async fn chat(
        &self,
        user_id: &str,
        message: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<ChatOutcome, ServiceError> {
        let lock = self.store.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut state = match conversation_id {
            Some(id) => {
                let state = self.store.load(id).await?.ok_or(ServiceError::NotFound)?;
                if state.user_id != user_id {
                    return Err(ServiceError::NotFound);
                }
                state
            }
            None => {
                let state = ConversationState::new(user_id);
                info!(conversation = %state.conversation_id, user = user_id, "new conversation");
                state
            }
        };

        let scratch = self.store.load_scratch(user_id).await?;
        scratch.seed(&mut state);

        if state.is_suspended() {
            state.resume_with(message);
        } else {
            state.messages.push(ConversationMessage::user(message));
        }

        self.run_and_persist(state).await
    }

    /// Resume a suspended conversation with the human's feedback.
    pub async fn resume(
        &self,
        conversation_id: Uuid,
        feedback: &str,
    ) -> Result<ChatOutcome, ServiceError> {
        // The lock is keyed by user, so probe for the owner first and
        // re-load under the lock.
        let probe = self
            .store
            .load(conversation_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let lock = self.store.user_lock(&probe.user_id);
        let _guard = lock.lock().await;

        let mut state = self
            .store
            .load(conversation_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        if !state.is_suspended() {
            return Err(ServiceError::NotSuspended);
        }

        let scratch = self.store.load_scratch(&state.user_id).await?;
        scratch.seed(&mut state);
        state.resume_with(feedback);

        self.run_and_persist(state).await
    }

    /// Fetch a stored conversation as-is.
    pub async fn get(&self, conversation_id: Uuid) -> Result<ConversationState, ServiceError> {
        self.store
            .load(conversation_id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    async fn run_and_persist(
        &self,
        state: ConversationState,
    ) -> Result<ChatOutcome, ServiceError> {
        let state = self.engine.run(self.graph.as_ref(), state).await?;

        self.store.save(&state).await?;
        self.store
            .save_scratch(&state.user_id, &UserScratch::from_state(&state))
            .await?;

        Ok(ChatOutcome::from_state(&state))
    }
}
