//! Graph definition: handlers, routes, entry point, and step bound.
//!
//! All structural validation happens in `GraphBuilder::build`; a
//! `GraphDefinition` that exists is valid, immutable, and shareable
//! across concurrently running conversations. Cycles through handlers
//! are legal and expected (booking loops on itself pending search
//! results); what `build` insists on is that the terminal marker can be
//! reached from the entry at all.

use std::collections::HashMap;

use petgraph::algo::has_path_connecting;
use petgraph::graph::DiGraph;
use thiserror::Error;

use concierge_types::agent::AgentName;
use concierge_types::conversation::Destination;

use crate::handler::{BoxHandler, Handler};

use super::routing::Route;

/// Structural problems found while building a graph. These fail at build
/// time, never at run time.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no entry handler declared")]
    MissingEntry,

    #[error("entry handler '{0}' is not registered")]
    UnknownEntry(AgentName),

    #[error("handler '{0}' registered twice")]
    DuplicateHandler(AgentName),

    #[error("handler '{from}' declares unregistered destination '{to}'")]
    UnknownDestination { from: AgentName, to: AgentName },

    #[error("handler '{0}' declares an empty destination set")]
    EmptyDestinations(AgentName),

    #[error("terminal marker is unreachable from entry '{0}'")]
    TerminalUnreachable(AgentName),

    #[error("max_steps must be at least 1")]
    ZeroStepLimit,

    #[error("an unattended graph must not include the human gate")]
    GateInUnattendedGraph,
}

/// A validated, immutable routing graph.
#[derive(Debug)]
pub struct GraphDefinition {
    name: String,
    entry: AgentName,
    handlers: HashMap<AgentName, BoxHandler>,
    routes: HashMap<AgentName, Route>,
    max_steps: u32,
}

impl GraphDefinition {
    pub fn builder(name: impl Into<String>, max_steps: u32) -> GraphBuilder {
        GraphBuilder {
            name: name.into(),
            entry: None,
            handlers: HashMap::new(),
            routes: HashMap::new(),
            max_steps,
            duplicate: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> AgentName {
        self.entry
    }

    /// The mandatory safety valve bounding every run of this graph.
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn has_handler(&self, name: AgentName) -> bool {
        self.handlers.contains_key(&name)
    }

    /// Look up a registered handler. Every name the engine can reach --
    /// the entry and all declared destinations -- was checked by `build`,
    /// so indexing cannot miss.
    pub fn handler(&self, name: AgentName) -> &BoxHandler {
        &self.handlers[&name]
    }

    /// Look up a handler's route. Same build-time guarantee as
    /// [`GraphDefinition::handler`].
    pub fn route(&self, name: AgentName) -> &Route {
        &self.routes[&name]
    }

    pub fn handler_names(&self) -> impl Iterator<Item = AgentName> + '_ {
        self.handlers.keys().copied()
    }

    /// Whether any handler declares the given destination. The polling
    /// graph relies on this being false for the human gate.
    pub fn any_route_declares(&self, destination: Destination) -> bool {
        self.routes.values().any(|route| route.declares(destination))
    }
}

/// Accumulates handlers and routes, then validates the whole topology.
pub struct GraphBuilder {
    name: String,
    entry: Option<AgentName>,
    handlers: HashMap<AgentName, BoxHandler>,
    routes: HashMap<AgentName, Route>,
    max_steps: u32,
    duplicate: Option<AgentName>,
}

impl GraphBuilder {
    pub fn entry(mut self, entry: AgentName) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Register a handler together with its route. The registration key
    /// is the handler's own name, so a handler cannot end up routed under
    /// somebody else's identity.
    pub fn register<H: Handler + 'static>(mut self, handler: H, route: Route) -> Self {
        let name = handler.name();
        if self.handlers.contains_key(&name) {
            self.duplicate.get_or_insert(name);
            return self;
        }
        self.handlers.insert(name, BoxHandler::new(handler));
        self.routes.insert(name, route);
        self
    }

    pub fn build(self) -> Result<GraphDefinition, ConfigurationError> {
        if self.max_steps == 0 {
            return Err(ConfigurationError::ZeroStepLimit);
        }
        if let Some(name) = self.duplicate {
            return Err(ConfigurationError::DuplicateHandler(name));
        }
        let entry = self.entry.ok_or(ConfigurationError::MissingEntry)?;
        if !self.handlers.contains_key(&entry) {
            return Err(ConfigurationError::UnknownEntry(entry));
        }

        for (from, route) in &self.routes {
            if route.destinations.is_empty() {
                return Err(ConfigurationError::EmptyDestinations(*from));
            }
            for destination in &route.destinations {
                if let Destination::Agent(to) = destination {
                    if !self.handlers.contains_key(to) {
                        return Err(ConfigurationError::UnknownDestination {
                            from: *from,
                            to: *to,
                        });
                    }
                }
            }
        }

        ensure_terminal_reachable(entry, &self.routes)?;

        Ok(GraphDefinition {
            name: self.name,
            entry,
            handlers: self.handlers,
            routes: self.routes,
            max_steps: self.max_steps,
        })
    }
}

/// Best-effort check that at least one declared path leads from the entry
/// to the terminal marker. Cycles are fine; a graph where every path
/// loops forever is not.
fn ensure_terminal_reachable(
    entry: AgentName,
    routes: &HashMap<AgentName, Route>,
) -> Result<(), ConfigurationError> {
    let mut graph = DiGraph::<(), ()>::new();
    let mut indices = HashMap::new();
    for name in routes.keys() {
        indices.insert(*name, graph.add_node(()));
    }
    // Synthetic node standing in for the terminal marker.
    let end_index = graph.add_node(());

    for (from, route) in routes {
        for destination in &route.destinations {
            let to_index = match destination {
                Destination::Agent(to) => indices[to],
                Destination::End => end_index,
            };
            graph.add_edge(indices[from], to_index, ());
        }
    }

    if has_path_connecting(&graph, indices[&entry], end_index, None) {
        Ok(())
    } else {
        Err(ConfigurationError::TerminalUnreachable(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_types::conversation::{ConversationState, StateUpdate};
    use concierge_types::error::DecisionError;

    use crate::handler::HandlerError;

    /// Helper: handler that returns an empty update under a given name.
    struct Noop(AgentName);

    impl Handler for Noop {
        fn name(&self) -> AgentName {
            self.0
        }

        async fn invoke(
            &self,
            _state: &ConversationState,
        ) -> Result<StateUpdate, HandlerError> {
            Ok(StateUpdate::default())
        }
    }

    fn to_end() -> Route {
        Route::fixed(Destination::End)
    }

    // -----------------------------------------------------------------------
    // Successful builds
    // -----------------------------------------------------------------------

    #[test]
    fn test_minimal_graph_builds() {
        let graph = GraphDefinition::builder("test", 5)
            .entry(AgentName::Supervisor)
            .register(Noop(AgentName::Supervisor), to_end())
            .build()
            .unwrap();

        assert_eq!(graph.entry(), AgentName::Supervisor);
        assert_eq!(graph.max_steps(), 5);
        assert!(graph.has_handler(AgentName::Supervisor));
        assert_eq!(graph.handler(AgentName::Supervisor).name(), AgentName::Supervisor);
    }

    #[test]
    fn test_cycles_are_legal_when_an_exit_exists() {
        // booking loops on itself pending search results, but can also end
        let graph = GraphDefinition::builder("test", 8)
            .entry(AgentName::Booking)
            .register(
                Noop(AgentName::Booking),
                Route::conditional(
                    [Destination::Agent(AgentName::Booking), Destination::End],
                    |_| Destination::End,
                ),
            )
            .build();
        assert!(graph.is_ok());
    }

    #[test]
    fn test_any_route_declares() {
        let graph = GraphDefinition::builder("test", 5)
            .entry(AgentName::Supervisor)
            .register(
                Noop(AgentName::Supervisor),
                Route::conditional(
                    [Destination::Agent(AgentName::Chitchat), Destination::End],
                    |_| Destination::End,
                ),
            )
            .register(Noop(AgentName::Chitchat), to_end())
            .build()
            .unwrap();

        assert!(graph.any_route_declares(Destination::Agent(AgentName::Chitchat)));
        assert!(!graph.any_route_declares(Destination::Agent(AgentName::HumanGate)));
    }

    // -----------------------------------------------------------------------
    // Rejected builds
    // -----------------------------------------------------------------------

    #[test]
    fn test_missing_entry_rejected() {
        let err = GraphDefinition::builder("test", 5)
            .register(Noop(AgentName::Supervisor), to_end())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingEntry));
    }

    #[test]
    fn test_unregistered_entry_rejected() {
        let err = GraphDefinition::builder("test", 5)
            .entry(AgentName::Email)
            .register(Noop(AgentName::Supervisor), to_end())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownEntry(AgentName::Email)));
    }

    #[test]
    fn test_unregistered_destination_rejected() {
        let err = GraphDefinition::builder("test", 5)
            .entry(AgentName::Supervisor)
            .register(
                Noop(AgentName::Supervisor),
                Route::conditional(
                    [Destination::Agent(AgentName::Scheduler), Destination::End],
                    |_| Destination::End,
                ),
            )
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownDestination {
                from: AgentName::Supervisor,
                to: AgentName::Scheduler,
            }
        ));
    }

    #[test]
    fn test_empty_destination_set_rejected() {
        let err = GraphDefinition::builder("test", 5)
            .entry(AgentName::Supervisor)
            .register(
                Noop(AgentName::Supervisor),
                Route::conditional([], |_| Destination::End),
            )
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::EmptyDestinations(AgentName::Supervisor)
        ));
    }

    #[test]
    fn test_unreachable_terminal_rejected() {
        // supervisor <-> chitchat with no path out
        let err = GraphDefinition::builder("test", 5)
            .entry(AgentName::Supervisor)
            .register(
                Noop(AgentName::Supervisor),
                Route::fixed(AgentName::Chitchat),
            )
            .register(
                Noop(AgentName::Chitchat),
                Route::fixed(AgentName::Supervisor),
            )
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::TerminalUnreachable(AgentName::Supervisor)
        ));
    }

    #[test]
    fn test_zero_step_limit_rejected() {
        let err = GraphDefinition::builder("test", 0)
            .entry(AgentName::Supervisor)
            .register(Noop(AgentName::Supervisor), to_end())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ZeroStepLimit));
    }

    #[test]
    fn test_duplicate_handler_rejected() {
        let err = GraphDefinition::builder("test", 5)
            .entry(AgentName::Supervisor)
            .register(Noop(AgentName::Supervisor), to_end())
            .register(Noop(AgentName::Supervisor), to_end())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::DuplicateHandler(AgentName::Supervisor)
        ));
    }
}
