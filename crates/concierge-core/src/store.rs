//! Conversation persistence contracts and the in-memory store.
//!
//! Suspended conversations must survive between engine runs keyed by
//! `conversation_id`, and the per-user scratch records (`email_data`,
//! `scheduler_data`, `context`) are shared between interactive runs and
//! polling ticks. The store does not serialize concurrent writers by
//! itself; callers take the per-user lock before load/run/persist so a
//! polling tick and a chat turn for the same user cannot silently drop
//! each other's appends.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use concierge_types::conversation::ConversationState;
use concierge_types::error::StoreError;

/// Per-user data that outlives any single conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserScratch {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub email_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub scheduler_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl UserScratch {
    /// Snapshot the shareable records out of a finished run's state.
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            email_data: state.email_data.clone(),
            scheduler_data: state.scheduler_data.clone(),
            context: state.context.clone(),
        }
    }

    /// Fold this scratch into a state about to run. Scratch entries win
    /// on key collisions: they carry the freshest external data (e.g.
    /// emails found by the poller since the conversation last ran).
    pub fn seed(&self, state: &mut ConversationState) {
        for (key, value) in &self.email_data {
            state.email_data.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.scheduler_data {
            state.scheduler_data.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.context {
            state.context.insert(key.clone(), value.clone());
        }
    }
}

/// Storage contract for conversations and per-user scratch.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition); services
/// stay generic over the store instead of boxing it.
pub trait ConversationStore: Send + Sync {
    fn load(
        &self,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<Option<ConversationState>, StoreError>> + Send;

    fn save(
        &self,
        state: &ConversationState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Load a user's scratch, empty if the user is new.
    fn load_scratch(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<UserScratch, StoreError>> + Send;

    fn save_scratch(
        &self,
        user_id: &str,
        scratch: &UserScratch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The lock serializing every load/run/persist cycle for one user.
    /// Same user, same lock; callers hold it across the whole cycle.
    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>>;
}

impl<S: ConversationStore> ConversationStore for Arc<S> {
    fn load(
        &self,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<Option<ConversationState>, StoreError>> + Send {
        (**self).load(conversation_id)
    }

    fn save(
        &self,
        state: &ConversationState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).save(state)
    }

    fn load_scratch(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<UserScratch, StoreError>> + Send {
        (**self).load_scratch(user_id)
    }

    fn save_scratch(
        &self,
        user_id: &str,
        scratch: &UserScratch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).save_scratch(user_id, scratch)
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        (**self).user_lock(user_id)
    }
}

/// Concurrent in-memory store. The default backend; a database-backed
/// store would implement the same trait.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: DashMap<Uuid, ConversationState>,
    scratch: DashMap<String, UserScratch>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}

impl ConversationStore for MemoryConversationStore {
    async fn load(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<ConversationState>, StoreError> {
        Ok(self
            .conversations
            .get(&conversation_id)
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.conversations
            .insert(state.conversation_id, state.clone());
        Ok(())
    }

    async fn load_scratch(&self, user_id: &str) -> Result<UserScratch, StoreError> {
        Ok(self
            .scratch
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save_scratch(&self, user_id: &str, scratch: &UserScratch) -> Result<(), StoreError> {
        self.scratch.insert(user_id.to_string(), scratch.clone());
        Ok(())
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }
}
