//! Core orchestration logic for Concierge.
//!
//! This crate owns the routing graph, the engine step loop, the
//! suspend/resume protocol, and the store traits everything else plugs
//! into. Handler implementations and provider clients live in
//! concierge-agents; the HTTP surface lives in concierge-api.

pub mod bus;
pub mod decision;
pub mod engine;
pub mod graph;
pub mod handler;
pub mod poll;
pub mod service;
pub mod store;
