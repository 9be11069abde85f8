//! Observability bootstrap shared by the Concierge binary.
//!
//! One call at startup wires the `tracing` subscriber; one call at exit
//! flushes whatever the optional OpenTelemetry pipeline buffered.

pub mod tracing_setup;
