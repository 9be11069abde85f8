//! Shared domain types for Concierge.
//!
//! This crate contains the core domain types used across the Concierge
//! assistant: conversation state and its merge policy, handler identity,
//! structured decision schemas, wellbeing snapshots, engine events, and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror,
//! schemars.

pub mod agent;
pub mod conversation;
pub mod decision;
pub mod emotion;
pub mod error;
pub mod event;
