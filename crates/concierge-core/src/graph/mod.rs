//! Routing graph: build-time-validated handler topology.
//!
//! - `routing` -- per-handler route rules (fixed edges and data-dependent
//!   routing functions) with declared destination sets
//! - `definition` -- `GraphBuilder`/`GraphDefinition`, all structural
//!   validation, terminal reachability

pub mod definition;
pub mod routing;
