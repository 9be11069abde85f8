//! HTTP layer: axum routes under `/api/v1/` plus the health probe.

pub mod error;
pub mod handlers;
pub mod router;
