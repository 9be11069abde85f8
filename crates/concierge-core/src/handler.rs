//! The handler capability contract and its type-erased wrapper.
//!
//! A handler consumes the conversation state and produces a partial
//! update; it makes at most one decision call per invocation, plus
//! whatever backend work its domain action needs. Retry policy belongs
//! to the collaborators, never to the engine.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use concierge_types::agent::AgentName;
use concierge_types::conversation::{ConversationState, StateUpdate};
use concierge_types::error::{BackendError, DecisionError};

/// Errors a handler invocation can surface.
///
/// The engine catches all of these at its boundary and converts them into
/// a degraded terminal state, so a failing collaborator never abandons
/// partial conversation state.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("decision provider failed: {0}")]
    Decision(#[from] DecisionError),

    #[error("backend call failed: {0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Internal(String),
}

/// One unit of domain logic in the routing graph.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). The graph
/// stores handlers behind [`BoxHandler`] for dynamic dispatch.
///
/// Implementations must not mutate anything outside their returned
/// update; the engine owns the merge.
pub trait Handler: Send + Sync {
    /// The name this handler is registered under.
    fn name(&self) -> AgentName;

    /// Produce a partial update from the current state.
    fn invoke(
        &self,
        state: &ConversationState,
    ) -> impl Future<Output = Result<StateUpdate, HandlerError>> + Send;
}

/// Object-safe version of [`Handler`] with boxed futures.
///
/// Exists solely to enable dynamic dispatch (`dyn HandlerDyn`). A blanket
/// implementation is provided for all types implementing `Handler`.
pub trait HandlerDyn: Send + Sync {
    fn name(&self) -> AgentName;

    fn invoke_boxed<'a>(
        &'a self,
        state: &'a ConversationState,
    ) -> Pin<Box<dyn Future<Output = Result<StateUpdate, HandlerError>> + Send + 'a>>;
}

/// Blanket implementation: any `Handler` automatically implements `HandlerDyn`.
impl<T: Handler> HandlerDyn for T {
    fn name(&self) -> AgentName {
        Handler::name(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        state: &'a ConversationState,
    ) -> Pin<Box<dyn Future<Output = Result<StateUpdate, HandlerError>> + Send + 'a>> {
        Box::pin(self.invoke(state))
    }
}

/// Type-erased handler stored in a graph definition.
///
/// Since `Handler` uses RPITIT it cannot be used as a trait object
/// directly; `BoxHandler` provides equivalent methods that delegate to
/// the inner `HandlerDyn` trait object.
pub struct BoxHandler {
    inner: Box<dyn HandlerDyn + Send + Sync>,
}

impl BoxHandler {
    /// Wrap a concrete `Handler` in a type-erased box.
    pub fn new<T: Handler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub fn name(&self) -> AgentName {
        self.inner.name()
    }

    pub async fn invoke(
        &self,
        state: &ConversationState,
    ) -> Result<StateUpdate, HandlerError> {
        self.inner.invoke_boxed(state).await
    }
}

impl std::fmt::Debug for BoxHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxHandler")
            .field("name", &self.inner.name())
            .finish()
    }
}
