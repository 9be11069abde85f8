//! Handler implementations for the Concierge graph.
//!
//! Everything that gives the orchestration engine its behavior lives
//! here: the eight handlers, the structured-output prompts they send,
//! the OpenAI-compatible decision provider, the backend tools they act
//! through, and the two assembled graph topologies. The engine itself
//! (concierge-core) knows none of these types; it sees only `Handler`
//! and `Route`.

pub mod graphs;
pub mod handlers;
pub mod llm;
pub mod prompts;
pub mod tools;
